//! # Quill Store
//!
//! The shared key-value store that rate-limit windows and cache entries live
//! in. [`KeyValueStore`] is the contract; [`RedisStore`] is the production
//! backend and [`MemoryStore`] an in-process stand-in with an outage switch.

mod error;
mod memory;
pub mod pattern;
mod redis_store;
mod store;
mod timeout;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::{create_pool, RedisStore};
pub use store::{KeyValueStore, SharedStore, WindowOutcome, WindowRequest, WindowSnapshot};
pub use timeout::with_timeout;
