//! # Quill Rate Limiting
//!
//! Sliding-window rate limiting over the shared key-value store.
//!
//! Each `(identity, action)` pair owns a window of event timestamps. A check
//! prunes timestamps older than the window, counts what is left and records
//! the new event only when the count is below the limit, all in one atomic
//! store call.
//!
//! ```rust,ignore
//! use quill_ratelimit::{Identity, RateLimitPolicy, RateLimiter};
//!
//! let limiter = RateLimiter::new(store, clock, "quill:rl");
//! let identity = Identity::ip("1.2.3.4");
//! let decision = limiter.check(&identity, "login", &RateLimitPolicy::auth()).await?;
//! if !decision.is_admitted() {
//!     // reply 429 with decision.retry_after_secs()
//! }
//! ```

mod decision;
mod identity;
mod limiter;
pub mod metrics;
mod policy;

pub use decision::{Decision, RateLimitStatus};
pub use identity::Identity;
pub use limiter::RateLimiter;
pub use policy::{PolicyRegistry, RateLimitPolicy};
pub use quill_config::{FailurePolicy, LimitScope};
