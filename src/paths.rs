//! Resource path normalization.
//!
//! Every request that might address the tracked collection goes through
//! [`normalize`] before anything else looks at it. The contract:
//!
//! 1. Scheme, host, port, query string and fragment are removed.
//! 2. Percent-escapes are decoded one segment at a time, so an encoded `/`
//!    inside an entity key never starts a new segment.
//! 3. The first configured deployment prefix that matches on a segment
//!    boundary is removed (`/sap/opu/odata/sap/SRV/zi_user` -> `/zi_user`).
//! 4. The result has exactly one leading `/`, no duplicate slashes and no
//!    trailing `/` (the root stays `/`).
//!
//! The normalized form is the key of a mirror snapshot.

use url::Url;

/// Normalize a URL or path into the canonical resource path.
pub fn normalize(input: &str, deployment_prefixes: &[String]) -> String {
  let raw_path = match Url::parse(input) {
    Ok(url) if url.has_host() => url.path().to_string(),
    _ => {
      let end = input.find(['?', '#']).unwrap_or(input.len());
      input[..end].to_string()
    }
  };

  let path = decode_segments(&raw_path);

  for prefix in deployment_prefixes {
    let prefix = canonical_slashes(prefix);
    if prefix == "/" {
      continue;
    }
    if let Some(rest) = path.strip_prefix(prefix.as_str()) {
      if rest.is_empty() {
        return "/".to_string();
      }
      if rest.starts_with('/') {
        return rest.to_string();
      }
    }
  }

  path
}

fn canonical_slashes(path: &str) -> String {
  let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
  format!("/{}", segments.join("/"))
}

fn decode_segments(path: &str) -> String {
  let segments: Vec<String> = path
    .split('/')
    .filter(|s| !s.is_empty())
    .map(percent_decode)
    .collect();
  format!("/{}", segments.join("/"))
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim.
fn percent_decode(input: &str) -> String {
  let bytes = input.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' && i + 2 < bytes.len() {
      let hi = (bytes[i + 1] as char).to_digit(16);
      let lo = (bytes[i + 2] as char).to_digit(16);
      if let (Some(hi), Some(lo)) = (hi, lo) {
        out.push((hi * 16 + lo) as u8);
        i += 3;
        continue;
      }
    }
    out.push(bytes[i]);
    i += 1;
  }
  String::from_utf8_lossy(&out).into_owned()
}

/// What a normalized path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePath {
  /// The whole collection, e.g. `/zi_user`
  Collection(String),
  /// One entity by key, e.g. `/zi_user('bob')`
  Entity { collection: String, key: String },
  /// The count sub-resource, e.g. `/zi_user/$count`
  Count(String),
}

impl ResourcePath {
  /// Classify a path already passed through [`normalize`].
  pub fn parse(path: &str) -> Self {
    if let Some(base) = path.strip_suffix("/$count") {
      return Self::Count(canonical_slashes(base));
    }

    if let Some(inner) = path.strip_suffix(')') {
      let last_segment_start = last_separator(inner).map(|i| i + 1).unwrap_or(0);
      if let Some(open) = inner[last_segment_start..].find('(') {
        let open = last_segment_start + open;
        if open > last_segment_start {
          if let Some(key) = parse_entity_key(&inner[open + 1..]) {
            return Self::Entity {
              collection: canonical_slashes(&inner[..open]),
              key,
            };
          }
        }
      }
    }

    Self::Collection(path.to_string())
  }

  /// The collection this path belongs to; also the mirror's resource key.
  pub fn collection(&self) -> &str {
    match self {
      Self::Collection(c) | Self::Count(c) => c,
      Self::Entity { collection, .. } => collection,
    }
  }
}

/// Byte offset of the last `/` not inside a quoted key literal.
fn last_separator(path: &str) -> Option<usize> {
  let mut quoted = false;
  let mut last = None;
  for (i, c) in path.char_indices() {
    match c {
      '\'' => quoted = !quoted,
      '/' if !quoted => last = Some(i),
      _ => {}
    }
  }
  last
}

/// Parse the text between the parentheses of an entity accessor.
///
/// Accepts `'text'` (with `''` as an escaped quote), a bare literal such as
/// `42`, and the named form `Field='text'`.
fn parse_entity_key(raw: &str) -> Option<String> {
  let raw = raw.trim();
  let raw = match raw.split_once('=') {
    Some((name, value)) if !name.contains('\'') => value.trim(),
    _ => raw,
  };

  if raw.is_empty() {
    return None;
  }

  match raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
    Some(quoted) => Some(quoted.replace("''", "'")),
    None if raw.contains('\'') => None,
    None => Some(raw.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn prefixes() -> Vec<String> {
    vec![
      "/sap/opu/odata/sap/ZGP_DENUSER_SRV".to_string(),
      "/odata/v2/".to_string(),
    ]
  }

  #[test]
  fn test_strips_scheme_host_and_query() {
    assert_eq!(
      normalize(
        "https://example.com:8443/sap/opu/odata/sap/ZGP_DENUSER_SRV/zi_denuser?$top=3#frag",
        &prefixes()
      ),
      "/zi_denuser"
    );
  }

  #[test]
  fn test_relative_path_with_prefix() {
    assert_eq!(
      normalize("/sap/opu/odata/sap/ZGP_DENUSER_SRV/zi_denuser", &prefixes()),
      "/zi_denuser"
    );
  }

  #[test]
  fn test_second_prefix_with_trailing_slash() {
    assert_eq!(normalize("/odata/v2/users/", &prefixes()), "/users");
  }

  #[test]
  fn test_prefix_must_match_on_segment_boundary() {
    assert_eq!(
      normalize("/sap/opu/odata/sap/ZGP_DENUSER_SRVX/zi_denuser", &prefixes()),
      "/sap/opu/odata/sap/ZGP_DENUSER_SRVX/zi_denuser"
    );
  }

  #[test]
  fn test_prefix_alone_is_root() {
    assert_eq!(
      normalize("https://h/sap/opu/odata/sap/ZGP_DENUSER_SRV/", &prefixes()),
      "/"
    );
  }

  #[test]
  fn test_no_prefix_configured() {
    assert_eq!(normalize("zi_denuser//", &[]), "/zi_denuser");
    assert_eq!(normalize("", &[]), "/");
  }

  #[test]
  fn test_percent_escapes_are_decoded() {
    assert_eq!(
      normalize("https://h/zi_denuser(%27Alice%20A%27)", &[]),
      "/zi_denuser('Alice A')"
    );
    assert_eq!(normalize("/bad%zzescape", &[]), "/bad%zzescape");
  }

  #[test]
  fn test_encoded_slash_stays_inside_entity_key() {
    let normalized = normalize("https://h/zi_denuser('a%2Fb')?$format=json", &[]);
    assert_eq!(normalized, "/zi_denuser('a/b')");
    assert_eq!(
      ResourcePath::parse(&normalized),
      ResourcePath::Entity {
        collection: "/zi_denuser".to_string(),
        key: "a/b".to_string(),
      }
    );
    assert_eq!(normalize("/zi_denuser('a%2F%2Fb')", &[]), "/zi_denuser('a//b')");
  }

  #[test]
  fn test_parse_collection() {
    assert_eq!(
      ResourcePath::parse("/zi_denuser"),
      ResourcePath::Collection("/zi_denuser".to_string())
    );
  }

  #[test]
  fn test_parse_entity_variants() {
    let expected = ResourcePath::Entity {
      collection: "/zi_denuser".to_string(),
      key: "bob".to_string(),
    };
    assert_eq!(ResourcePath::parse("/zi_denuser('bob')"), expected);
    assert_eq!(ResourcePath::parse("/zi_denuser(Username='bob')"), expected);
    assert_eq!(
      ResourcePath::parse("/zi_denuser('o''brien')"),
      ResourcePath::Entity {
        collection: "/zi_denuser".to_string(),
        key: "o'brien".to_string(),
      }
    );
    assert_eq!(
      ResourcePath::parse("/orders(42)"),
      ResourcePath::Entity {
        collection: "/orders".to_string(),
        key: "42".to_string(),
      }
    );
  }

  #[test]
  fn test_parse_count() {
    let path = ResourcePath::parse("/zi_denuser/$count");
    assert_eq!(path, ResourcePath::Count("/zi_denuser".to_string()));
    assert_eq!(path.collection(), "/zi_denuser");
  }

  #[test]
  fn test_malformed_accessor_is_a_collection() {
    assert_eq!(
      ResourcePath::parse("/zi_denuser()"),
      ResourcePath::Collection("/zi_denuser()".to_string())
    );
    assert_eq!(
      ResourcePath::parse("/(x)"),
      ResourcePath::Collection("/(x)".to_string())
    );
  }
}
