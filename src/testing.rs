//! In-process transport for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::remote::{Method, RemoteRequest, RemoteResponse, Transport, TransportError};

struct Route {
  method: Method,
  path: String,
  status: u16,
  body: Vec<u8>,
  delay: Duration,
}

/// Scripted transport. Unrouted requests get a 404; when unreachable every
/// request fails with a network error.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<Vec<Route>>,
  calls: Mutex<Vec<String>>,
  bodies: Mutex<Vec<Option<Vec<u8>>>>,
  unreachable: AtomicBool,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, method: Method, path: &str, status: u16, body: impl Into<Vec<u8>>) {
    self.respond_after(method, path, status, body, Duration::ZERO);
  }

  /// Like [`FakeTransport::respond`], answering only after `delay`.
  pub fn respond_after(
    &self,
    method: Method,
    path: &str,
    status: u16,
    body: impl Into<Vec<u8>>,
    delay: Duration,
  ) {
    let mut routes = self.routes.lock().unwrap();
    routes.retain(|r| !(r.method == method && r.path == path));
    routes.push(Route {
      method,
      path: path.to_string(),
      status,
      body: body.into(),
      delay,
    });
  }

  pub fn set_unreachable(&self, unreachable: bool) {
    self.unreachable.store(unreachable, Ordering::SeqCst);
  }

  /// `"METHOD /path?query"` for every request seen, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn bodies(&self) -> Vec<Option<Vec<u8>>> {
    self.bodies.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
    let target = match request.url.query() {
      Some(q) => format!("{} {}?{}", request.method, request.url.path(), q),
      None => format!("{} {}", request.method, request.url.path()),
    };
    self.calls.lock().unwrap().push(target);
    self.bodies.lock().unwrap().push(request.body.clone());

    if self.unreachable.load(Ordering::SeqCst) {
      return Err(TransportError::Network("connection refused".to_string()));
    }

    let (status, body, delay) = {
      let routes = self.routes.lock().unwrap();
      match routes
        .iter()
        .find(|r| r.method == request.method && r.path == request.url.path())
      {
        Some(route) => (route.status, route.body.clone(), route.delay),
        None => (404, b"not found".to_vec(), Duration::ZERO),
      }
    };

    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }

    Ok(RemoteResponse::new(status, body))
  }
}
