//! The canonical collection envelope and ingress normalization.
//!
//! The backend answers collection reads in several shapes depending on
//! protocol version and gateway: `{"d": {"results": [...]}}`,
//! `{"results": [...]}`, `{"value": [...]}` or a bare array. They are all
//! turned into one [`Envelope`] as soon as a body enters the engine, so
//! nothing downstream ever inspects raw response shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of the tracked collection. Field order is preserved.
pub type Record = Map<String, Value>;

/// `{results: [...], count?}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
  pub results: Vec<Record>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub count: Option<u64>,
}

impl Envelope {
  pub fn new(results: Vec<Record>) -> Self {
    Self {
      results,
      count: None,
    }
  }

  pub fn with_count(mut self, count: u64) -> Self {
    self.count = Some(count);
    self
  }

  /// Normalize any supported collection body.
  pub fn from_body(body: &[u8]) -> serde_json::Result<Self> {
    let wire: WireCollection = serde_json::from_slice(body)?;
    Ok(wire.into_envelope())
  }

  pub fn to_body(&self) -> Vec<u8> {
    // Serializing maps of JSON values cannot fail.
    serde_json::to_vec(self).unwrap_or_else(|_| b"{\"results\":[]}".to_vec())
  }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireCollection {
  Bare(Vec<Record>),
  Wrapped {
    d: Box<WireCollection>,
  },
  Results {
    results: Vec<Record>,
    #[serde(default, alias = "__count")]
    count: Option<WireCount>,
  },
  Value {
    value: Vec<Record>,
    #[serde(default, rename = "@odata.count")]
    count: Option<WireCount>,
  },
}

/// Counts arrive as numbers or, in the v2 protocol, as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireCount {
  Number(u64),
  Text(String),
}

impl WireCount {
  fn value(&self) -> Option<u64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Text(s) => s.trim().parse().ok(),
    }
  }
}

impl WireCollection {
  fn into_envelope(self) -> Envelope {
    match self {
      Self::Bare(results) => Envelope::new(results),
      Self::Wrapped { d } => d.into_envelope(),
      Self::Results { results, count } | Self::Value { value: results, count } => Envelope {
        results,
        count: count.as_ref().and_then(WireCount::value),
      },
    }
  }
}
