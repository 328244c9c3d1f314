//! # Quill REST
//!
//! Axum glue for the rate limiter and cache layer: request middleware,
//! administrative endpoints and health checks.

pub mod controllers;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
