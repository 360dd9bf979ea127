//! Generation-partitioned response cache.
//!
//! - Stores successful GET responses keyed by method + URL, per generation
//! - Serves static assets cache-first and navigations network-first
//! - Migrates static assets between generations and deletes old ones

mod generation;
mod layer;
mod storage;
mod traits;

pub use generation::{ActivationReport, GenerationManager, InstallOutcome};
pub use layer::CacheLayer;
pub use storage::{ContentCache, Generation, GenerationState};
pub use traits::{CachedResponse, RequestKey, Response, ResponseSource};
