//! Beacon Engine Library
//!
//! Actors, observables and the compositor that joins them, plus the node
//! launchers built on top. Used by the `beacon` binary and integration tests.

/// Actor substrate: spawning, task identity and mailboxes
pub mod actor;

/// Observable slots of state owned by one actor
pub mod observable;

/// Compositor joining several observables
pub mod observer;

/// Node bootstrap launchers
pub mod launcher;

/// Agent supervisor
pub mod agent;

/// Wait-strategy harness
pub mod strategies;

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// CLI command handlers
pub mod handlers;
