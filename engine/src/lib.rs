//! Cadence Engine Library
//!
//! Study-planning conversations between a human, a model-backed planner and a
//! calendar synchronizer. Used by the `cadence` binary, the HTTP adapter and
//! the integration tests.

/// Configuration management module
pub mod config;

/// Secret resolution module
pub mod secrets;

/// LLM provider abstraction layer
pub mod llm;

/// Schedule artifact model and validation
pub mod schedule;

/// Calendar integration
pub mod calendar;

/// Turn routing, tool gate and conversation loop
pub mod conversation;

/// Conversation participants
pub mod participants;

/// Session management and storage
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
