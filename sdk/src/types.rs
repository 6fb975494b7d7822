//! Shared conversation types
//!
//! Types that cross the boundary between the engine and its adapters
//! (CLI, HTTP). They serialize as lowercase strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A participant role in a planning conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking for a study plan
    Human,

    /// Drafts the schedule and persists it
    Planner,

    /// Pushes a persisted schedule to the external calendar
    Synchronizer,
}

impl Role {
    /// All roles, in roster order
    pub const ALL: [Role; 3] = [Role::Human, Role::Planner, Role::Synchronizer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Planner => "planner",
            Role::Synchronizer => "synchronizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "user" => Ok(Role::Human),
            "planner" | "planneragent" => Ok(Role::Planner),
            "synchronizer" | "calendaragent" => Ok(Role::Synchronizer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Lifecycle status of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, or waiting for the human's next turn
    Pending,

    /// The conversation loop is driving participants
    Running,

    /// Terminated normally (termination token or turn limit)
    Completed,

    /// Ended by a fatal routing fault
    Failed,

    /// Cancelled by the caller between iterations
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the session can no longer accept turns
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
