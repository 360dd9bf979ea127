//! Network access to the backend.
//!
//! Everything that leaves the process goes through [`Transport`], so the
//! interceptor and the replayer can be driven by an in-process fake in tests.

mod client;
mod types;

use async_trait::async_trait;

pub use client::HttpClient;
pub use reqwest::Method;
pub use types::{RemoteRequest, RemoteResponse, TransportError};

#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;
}
