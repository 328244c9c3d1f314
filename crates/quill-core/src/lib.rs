//! # Quill Core
//!
//! Core types shared by every Quill crate: the unified error taxonomy,
//! result aliases, the clock abstraction used for time-windowed logic,
//! and tracing initialisation.

pub mod clock;
pub mod error;
pub mod result;
pub mod telemetry;

pub use clock::*;
pub use error::*;
pub use result::*;
pub use telemetry::*;
