//! Conversation engine
//!
//! - [`transcript`]: append-only turn history
//! - [`roster`]: the fixed set of roles in a conversation
//! - [`router`]: pure next-speaker selection
//! - [`gate`]: which role may run which tool, and running it
//! - [`driver`]: the loop tying them together

use chrono::{DateTime, Utc};
use sdk::types::{Role, SessionStatus};
use serde::Serialize;

use crate::schedule::ScheduleArtifact;

pub mod driver;
pub mod gate;
pub mod roster;
pub mod router;
pub mod transcript;

pub use driver::{ConversationLoop, LoopError, LoopLimits, RunOutcome, StepOutcome};
pub use gate::{ToolGate, ToolOutcome};
pub use roster::Roster;
pub use router::{Decision, Rule, RoutingError, Selection, TurnRouter};
pub use transcript::{ToolStatus, Transcript, Turn, TurnBody, TurnKind};

/// Why a conversation ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The human typed the termination token
    Token,
    /// The turn limit for a run was reached
    MaxTurns,
}

/// One logical dialogue: roster, transcript, artifact slot and lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: String,
    pub roster: Roster,
    pub transcript: Transcript,
    pub last_selected: Option<Role>,
    /// Artifact persisted by the Planner and not yet synced
    pub artifact: Option<ScheduleArtifact>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(roster: Roster) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            roster,
            transcript: Transcript::new(),
            last_selected: None,
            artifact: None,
            status: SessionStatus::Pending,
            termination: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Append a turn and return its sequence number
    pub fn append(&mut self, source: Role, body: TurnBody) -> u64 {
        self.updated_at = Utc::now();
        self.transcript.push(source, body)
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub(crate) fn complete(&mut self, reason: TerminationReason) {
        self.termination = Some(reason);
        self.set_status(SessionStatus::Completed);
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.set_status(SessionStatus::Failed);
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }
}
