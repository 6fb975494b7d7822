//! Cadence SDK
//!
//! Shared error and wire types for Cadence components.
//! This crate is used by the engine and by the HTTP adapter.

/// Error types and handling
pub mod errors;

/// Shared conversation types
pub mod types;

pub use errors::{EngineError, ErrorExt};
pub use types::{Role, SessionStatus};
