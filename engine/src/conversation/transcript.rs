//! Append-only turn history
//!
//! Sequence numbers start at 1 and are the only ordering key. The timestamp
//! on each turn is informational.

use chrono::{DateTime, Utc};
use sdk::types::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a tool invocation as recorded in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// What a turn carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnBody {
    Text {
        content: String,
    },
    ToolCall {
        call_id: String,
        tool: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        tool: String,
        status: ToolStatus,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Synthetic turn recording a failed participant invocation
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Text,
    ToolCall,
    ToolResult,
    Error,
}

impl TurnBody {
    pub fn text(content: impl Into<String>) -> Self {
        TurnBody::Text {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TurnBody::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TurnKind {
        match self {
            TurnBody::Text { .. } => TurnKind::Text,
            TurnBody::ToolCall { .. } => TurnKind::ToolCall,
            TurnBody::ToolResult { .. } => TurnKind::ToolResult,
            TurnBody::Error { .. } => TurnKind::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub seq: u64,
    pub source: Role,
    #[serde(flatten)]
    pub body: TurnBody,
    pub at: DateTime<Utc>,
}

impl Turn {
    /// Text content, for text turns only
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            TurnBody::Text { content } => Some(content),
            _ => None,
        }
    }

    /// True for a successful result of the named tool
    pub fn is_successful_result_of(&self, tool_name: &str) -> bool {
        matches!(
            &self.body,
            TurnBody::ToolResult { tool, status: ToolStatus::Success, .. } if tool == tool_name
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its sequence number
    pub fn push(&mut self, source: Role, body: TurnBody) -> u64 {
        let seq = self.turns.last().map(|t| t.seq + 1).unwrap_or(1);
        self.turns.push(Turn {
            seq,
            source,
            body,
            at: Utc::now(),
        });
        seq
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Most recent turn from `role`
    pub fn latest_from(&self, role: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.source == role)
    }

    /// Turns after the most recent human turn: the current planning cycle
    pub fn current_cycle(&self) -> &[Turn] {
        match self.turns.iter().rposition(|t| t.source == Role::Human) {
            Some(pos) => &self.turns[pos + 1..],
            None => &self.turns,
        }
    }

    /// Turns with a sequence number greater than `seq`
    pub fn since(&self, seq: u64) -> &[Turn] {
        let start = self.turns.partition_point(|t| t.seq <= seq);
        &self.turns[start..]
    }

    /// Highest assigned sequence number, 0 when empty
    pub fn last_seq(&self) -> u64 {
        self.turns.last().map(|t| t.seq).unwrap_or(0)
    }
}
