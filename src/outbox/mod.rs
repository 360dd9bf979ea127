//! Offline mutations: durable queue, ordered replay, and the write path that
//! decides between sending now and queueing for later.

mod queue;
mod replay;
mod writer;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::UpdateMethod;
use crate::db::StoreError;
use crate::remote::{Method, RemoteRequest, TransportError};

pub use queue::{MutationQueue, OperationKind, QueueItem};
pub use replay::{ReplayReport, Replayer};
pub use writer::{OfflineWriter, Submitted};

#[derive(Debug, Error)]
pub enum OutboxError {
  /// The mutation could not be stored; it must not be assumed queued
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Request(#[from] TransportError),
}

/// Turn a mutation into the request the backend expects.
pub fn build_request(
  origin: &Url,
  kind: OperationKind,
  target_path: &str,
  payload: Option<&Value>,
  update_method: UpdateMethod,
) -> Result<RemoteRequest, TransportError> {
  let url = origin
    .join(target_path)
    .map_err(|e| TransportError::Invalid(format!("bad target '{}': {}", target_path, e)))?;

  let mut request = match (kind, update_method) {
    (OperationKind::Create, _) => RemoteRequest::new(Method::POST, url),
    (OperationKind::Update, UpdateMethod::Put) => RemoteRequest::new(Method::PUT, url),
    (OperationKind::Update, UpdateMethod::Patch) => RemoteRequest::new(Method::PATCH, url),
    (OperationKind::Update, UpdateMethod::Merge) => {
      RemoteRequest::new(Method::POST, url).with_header("X-HTTP-Method", "MERGE")
    }
    (OperationKind::Delete, _) => RemoteRequest::new(Method::DELETE, url),
  };

  if let Some(payload) = payload {
    request = request
      .with_json(payload)
      .map_err(|e| TransportError::Invalid(format!("unserializable payload: {}", e)))?;
  }
  Ok(request.with_header("Accept", "application/json"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn origin() -> Url {
    Url::parse("https://h/sap/opu/odata/sap/SRV/").unwrap()
  }

  #[test]
  fn test_methods_per_kind() {
    let cases = [
      (OperationKind::Create, UpdateMethod::Put, Method::POST),
      (OperationKind::Update, UpdateMethod::Put, Method::PUT),
      (OperationKind::Update, UpdateMethod::Patch, Method::PATCH),
      (OperationKind::Update, UpdateMethod::Merge, Method::POST),
      (OperationKind::Delete, UpdateMethod::Merge, Method::DELETE),
    ];
    for (kind, update, expected) in cases {
      let request = build_request(&origin(), kind, "zi_denuser", None, update).unwrap();
      assert_eq!(request.method, expected, "{:?}/{:?}", kind, update);
    }
  }

  #[test]
  fn test_merge_is_tunnelled() {
    let request = build_request(
      &origin(),
      OperationKind::Update,
      "zi_denuser('bob')",
      Some(&json!({"Age": 3})),
      UpdateMethod::Merge,
    )
    .unwrap();
    assert!(request
      .headers
      .contains(&("X-HTTP-Method".to_string(), "MERGE".to_string())));
    assert_eq!(request.body.as_deref(), Some(&br#"{"Age":3}"#[..]));
  }

  #[test]
  fn test_target_resolution() {
    let relative = build_request(
      &origin(),
      OperationKind::Delete,
      "zi_denuser('bob')",
      None,
      UpdateMethod::Put,
    )
    .unwrap();
    assert_eq!(relative.url.path(), "/sap/opu/odata/sap/SRV/zi_denuser('bob')");

    let absolute =
      build_request(&origin(), OperationKind::Delete, "/other('x')", None, UpdateMethod::Put)
        .unwrap();
    assert_eq!(absolute.url.path(), "/other('x')");
    assert!(absolute.body.is_none());
  }
}
