//! Offline-first request handling for a web app backed by one remote
//! collection: generation-aware response caching, query emulation over a
//! local mirror, and a durable queue of writes replayed on reconnect.

pub mod cache;
pub mod config;
pub mod db;
pub mod engine;
pub mod envelope;
pub mod event;
pub mod filter;
pub mod intercept;
pub mod logging;
pub mod mirror;
pub mod outbox;
pub mod paths;
pub mod query;
pub mod reachability;
pub mod remote;

#[cfg(test)]
pub mod testing;

pub use engine::Engine;
