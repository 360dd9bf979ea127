//! Query emulation against the local mirror.
//!
//! Answers the reads the app issues while offline: the full collection,
//! one entity by key, and the `$count` sub-resource, honoring `$filter`,
//! `$skip`, `$top`, `$select` and `$inlinecount`. Everything here is
//! read-only; concurrent queries against the same snapshot are safe.
//!
//! # Example
//!
//! ```ignore
//! let engine = QueryEngine::new(mirror, "Username");
//! let path = ResourcePath::parse("/zi_denuser");
//! let options = QueryOptions::from_pairs([("$filter", "substringof('A',Name)"), ("$top", "5")]);
//! let outcome = engine.execute(&path, &options).await;
//! ```

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::envelope::{Envelope, Record};
use crate::filter::{loose_eq, Filter};
use crate::mirror::MirrorStore;
use crate::paths::ResourcePath;

/// Field the backend uses for per-record metadata; never projected away.
pub const METADATA_FIELD: &str = "__metadata";

/// Recognized system query options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
  /// Every `$filter` occurrence; all must hold
  pub filters: Vec<String>,
  pub skip: Option<usize>,
  pub top: Option<usize>,
  pub select: Option<Vec<String>>,
  pub inline_count: bool,
}

impl QueryOptions {
  /// Build from decoded query pairs. Unrecognized keys are ignored.
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    let mut options = Self::default();

    for (key, value) in pairs {
      let value = value.as_ref();
      match key.as_ref() {
        "$filter" => options.filters.push(value.to_string()),
        "$skip" => options.skip = parse_count("$skip", value).or(options.skip),
        "$top" => options.top = parse_count("$top", value).or(options.top),
        "$select" => {
          options.select = Some(
            value
              .split(',')
              .map(str::trim)
              .filter(|f| !f.is_empty())
              .map(String::from)
              .collect(),
          )
        }
        "$inlinecount" => options.inline_count = value == "allpages",
        other => debug!(option = other, "Ignoring query option"),
      }
    }

    options
  }

  pub fn from_url(url: &Url) -> Self {
    Self::from_pairs(url.query_pairs())
  }

  /// Whether the request narrows or reshapes rows. A read without any of
  /// these is a full collection read.
  pub fn restricts_rows(&self) -> bool {
    !self.filters.is_empty() || self.skip.is_some() || self.top.is_some() || self.select.is_some()
  }
}

fn parse_count(option: &str, value: &str) -> Option<usize> {
  match value.trim().parse() {
    Ok(n) => Some(n),
    Err(_) => {
      warn!(option, value, "Ignoring non-numeric paging option");
      None
    }
  }
}

/// The answer to one emulated read.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
  Collection(Envelope),
  Entity(Record),
  Count(usize),
  NotFound { collection: String, key: String },
}

impl QueryOutcome {
  pub fn status(&self) -> u16 {
    match self {
      Self::NotFound { .. } => 404,
      _ => 200,
    }
  }

  pub fn content_type(&self) -> &'static str {
    match self {
      Self::Count(_) => "text/plain",
      _ => "application/json",
    }
  }

  pub fn body(&self) -> Vec<u8> {
    match self {
      Self::Collection(envelope) => envelope.to_body(),
      Self::Entity(record) => Envelope::new(vec![record.clone()]).to_body(),
      Self::Count(n) => n.to_string().into_bytes(),
      Self::NotFound { collection, key } => json!({
        "error": {
          "code": "NotFound",
          "message": format!("No entry with key '{}' in {}", key, collection),
        }
      })
      .to_string()
      .into_bytes(),
    }
  }
}

/// Answers queries from the mirror.
#[derive(Clone)]
pub struct QueryEngine {
  mirror: MirrorStore,
  key_field: String,
}

impl QueryEngine {
  pub fn new(mirror: MirrorStore, key_field: impl Into<String>) -> Self {
    Self {
      mirror,
      key_field: key_field.into(),
    }
  }

  /// Run one query. Never fails: an unreadable store yields an empty envelope.
  pub async fn execute(&self, path: &ResourcePath, options: &QueryOptions) -> QueryOutcome {
    let records = match self.mirror.snapshot(path.collection()).await {
      Ok(Some(snapshot)) => snapshot.envelope.results,
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(collection = path.collection(), error = %e, "Mirror unavailable, serving empty result");
        return QueryOutcome::Collection(Envelope::default());
      }
    };

    run(path, options, &records, &self.key_field)
  }
}

/// Evaluate a query over an in-memory record list.
pub fn run(
  path: &ResourcePath,
  options: &QueryOptions,
  records: &[Record],
  key_field: &str,
) -> QueryOutcome {
  if let ResourcePath::Entity { collection, key } = path {
    let wanted = Value::String(key.clone());
    return match records
      .iter()
      .find(|r| r.get(key_field).is_some_and(|v| loose_eq(v, &wanted)))
    {
      Some(record) => QueryOutcome::Entity(record.clone()),
      None => QueryOutcome::NotFound {
        collection: collection.clone(),
        key: key.clone(),
      },
    };
  }

  let filtered: Vec<&Record> = match Filter::parse_all(options.filters.iter().map(String::as_str)) {
    Ok(Some(filter)) => records.iter().filter(|r| filter.matches(r)).collect(),
    Ok(None) => records.iter().collect(),
    Err(e) => {
      warn!(filter = ?options.filters, error = %e, "Unparseable $filter, returning no records");
      Vec::new()
    }
  };

  if matches!(path, ResourcePath::Count(_)) {
    return QueryOutcome::Count(filtered.len());
  }

  let total = filtered.len();

  let skipped = filtered.into_iter().skip(options.skip.unwrap_or(0));
  let page: Vec<&Record> = match options.top {
    Some(top) if top > 0 => skipped.take(top).collect(),
    _ => skipped.collect(),
  };

  let results = match &options.select {
    Some(fields) => page
      .into_iter()
      .map(|r| project(r, fields, key_field))
      .collect(),
    None => page.into_iter().cloned().collect(),
  };

  let envelope = Envelope::new(results);
  QueryOutcome::Collection(if options.inline_count {
    envelope.with_count(total as u64)
  } else {
    envelope
  })
}

/// Keep only the selected top-level fields, plus metadata and the key.
fn project(record: &Record, fields: &[String], key_field: &str) -> Record {
  if fields.iter().any(|f| f == "*") {
    return record.clone();
  }

  let wanted: Vec<&str> = fields
    .iter()
    .map(|f| f.split(['/', '.']).next().unwrap_or(f.as_str()))
    .collect();

  record
    .iter()
    .filter(|(name, _)| {
      name.as_str() == METADATA_FIELD || name.as_str() == key_field || wanted.contains(&name.as_str())
    })
    .map(|(name, value)| (name.clone(), value.clone()))
    .collect::<Map<String, Value>>()
}
