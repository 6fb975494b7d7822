//! Error types and handling
//!
//! This module provides the error types used throughout the Cadence engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry API keys or OAuth tokens. Provider and calendar
//! failures are reported with the HTTP status and response body only.

use thiserror::Error;

/// Trait for Cadence error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors leave the conversation usable: the participant can
    /// retry or the human can rephrase. Non-recoverable errors end the
    /// conversation with a failed status.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Model provider**: API failures, authentication errors, timeouts
/// - **Routing**: Non-convergence, roster violations
/// - **Session**: Unknown or busy conversations
/// - **Schedule**: Artifact validation and precondition failures
/// - **Calendar**: External sync failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::ArtifactValidation("event 1 ends before it starts".into());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::RoutingNonConvergence { iterations: 25 };
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Model provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("All LLM providers exhausted")]
    AllProvidersExhausted,

    #[error("Participant timed out after {0}s")]
    ParticipantTimeout(u64),

    // Routing errors
    #[error("Routing did not converge after {iterations} iterations")]
    RoutingNonConvergence { iterations: usize },

    #[error("Role not in roster: {0}")]
    RoleNotInRoster(String),

    #[error("Invalid roster: {0}")]
    InvalidRoster(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session busy: {0}")]
    SessionBusy(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    // Schedule errors
    #[error("Schedule artifact rejected: {0}")]
    ArtifactValidation(String),

    #[error("No schedule artifact has been persisted")]
    ArtifactMissing,

    #[error("Tool not permitted: {role} may not call {tool}")]
    ToolNotPermitted { role: String, tool: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    // Calendar errors
    #[error("Calendar sync failed: {0}")]
    CalendarSync(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::AllProvidersExhausted => "No LLM providers available. Check configuration",
            Self::ParticipantTimeout(_) => "The assistant took too long to respond. Try again",

            Self::RoutingNonConvergence { .. } => {
                "The conversation stopped making progress. Start a new session"
            }
            Self::RoleNotInRoster(_) | Self::InvalidRoster(_) => {
                "Conversation participants are misconfigured"
            }

            Self::SessionNotFound(_) => "No conversation exists with that id",
            Self::SessionBusy(_) => "The conversation is already running. Wait for it to finish",
            Self::SessionClosed(_) => "The conversation has ended. Start a new session",

            Self::ArtifactValidation(_) => "The schedule is invalid. Each event must end after it starts",
            Self::ArtifactMissing => "No schedule has been saved yet",
            Self::ToolNotPermitted { .. } => "This participant cannot perform that action",
            Self::UnknownTool(_) => "The requested action is not available",

            Self::CalendarSync(_) => "Calendar sync failed. Check your calendar token and network",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::AllProvidersExhausted
            | Self::RoutingNonConvergence { .. }
            | Self::RoleNotInRoster(_)
            | Self::InvalidRoster(_)
            | Self::SessionClosed(_) => false,

            _ => true,
        }
    }
}
