//! rf-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for all other rf-* crates,
//! providing type-safe identifiers, a unified error type, the episode
//! lifecycle enums with their transition maps, and application
//! configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod status;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorCategory, Result};
pub use ids::*;
pub use status::*;
