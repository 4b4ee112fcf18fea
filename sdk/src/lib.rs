//! Beacon SDK
//!
//! Shared library providing error types and identity types for Beacon components.
//! This crate is used by the engine and by anything consuming its observables.

/// Error types and handling
pub mod errors;

/// Identity types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use types::{ActorId, ObservableId};
