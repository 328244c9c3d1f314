//! # Quill Cache
//!
//! Read-through caching over the shared store: deterministic key
//! generation, a [`CacheLayer`] facade with timeouts and fail-open reads,
//! pattern invalidation for writes, and a function-caching wrapper.

mod cached_fn;
mod finite;
mod invalidation;
pub mod keys;
mod layer;
pub mod metrics;
mod response;
mod stats;

pub use cached_fn::CachedFn;
pub use invalidation::{Invalidation, InvalidationRequest};
pub use keys::{CacheKeyGenerator, KeyBuilder};
pub use layer::CacheLayer;
pub use response::CachedResponse;
pub use stats::{CacheStats, CacheStatsSnapshot};
