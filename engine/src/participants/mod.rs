//! Conversation participants
//!
//! A participant sees the transcript read-only and answers with at most one
//! text turn plus any number of tool requests. The conversation loop routes
//! tool requests through the gate and records call/result pairs.

use async_trait::async_trait;
use sdk::types::Role;
use serde_json::Value;
use std::time::Duration;

use crate::conversation::gate::ToolOutcome;
use crate::conversation::transcript::Transcript;
use crate::llm::LLMError;

pub mod human;
pub mod planner;
pub mod synchronizer;

pub use human::{render_for_console, ConsoleHuman, DetachedHuman};
pub use planner::ModelParticipant;
pub use synchronizer::CalendarSynchronizer;

#[derive(Debug, thiserror::Error)]
pub enum ParticipantError {
    #[error("model call failed: {0}")]
    Model(#[from] LLMError),

    #[error("input unavailable: {0}")]
    Input(String),
}

/// A tool call as requested by a participant, before the gate sees it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub call_id: String,
    pub tool: String,
    pub arguments: Value,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: format!("call_{}", uuid::Uuid::new_v4()),
            tool: tool.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Turns to append: optional text first, then the tool requests in order
    Message {
        text: Option<String>,
        tool_calls: Vec<ToolRequest>,
    },
    /// Nothing to contribute right now; the loop pauses for outside input
    Yield,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Reply::Message {
            text: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(request: ToolRequest) -> Self {
        Reply::Message {
            text: None,
            tool_calls: vec![request],
        }
    }

    pub fn empty() -> Self {
        Reply::Message {
            text: None,
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Participant: Send + Sync {
    fn role(&self) -> Role;

    /// Tool names this participant declares
    fn tools(&self) -> &[&'static str] {
        &[]
    }

    async fn respond(&self, transcript: &Transcript) -> Result<Reply, ParticipantError>;

    /// Bound on one `respond` call given the loop's default; `None` waits indefinitely
    fn timeout(&self, default: Duration) -> Option<Duration> {
        Some(default)
    }

    /// Text appended after this participant's tool results, if any
    fn summarize(&self, _outcomes: &[ToolOutcome]) -> Option<String> {
        None
    }
}
