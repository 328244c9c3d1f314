//! Request middleware.

mod auth;
mod logging;
mod page_cache;
mod rate_limit;

pub use auth::*;
pub use logging::*;
pub use page_cache::*;
pub use rate_limit::*;
