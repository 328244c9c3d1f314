//! # Quill Config
//!
//! Configuration management for Quill.
//! Supports layered configuration from files and environment variables,
//! validated before the server starts.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
