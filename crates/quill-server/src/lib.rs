//! # Quill Server Library
//!
//! Component wiring and startup utilities for the Quill server binary.

pub mod app;
pub mod startup;

pub use app::*;
