//! Calendar integration
//!
//! [`CalendarSync`] is the side-effecting half of the tool protocol: it takes a
//! validated [`ScheduleArtifact`] and creates one calendar entry per event.
//! There is no dedup key; syncing the same artifact twice creates the events twice.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleArtifact;

pub mod google;

pub use google::GoogleCalendarClient;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no calendar token available: {0}")]
    MissingToken(String),

    #[error(
        "calendar rejected event {} with status {} after creating {} event(s): {}",
        .index,
        .status,
        .partial.created,
        .body
    )]
    Rejected {
        index: usize,
        status: u16,
        body: String,
        /// Events created before the rejection; they stay in the calendar
        partial: SyncReceipt,
    },

    #[error("calendar request failed: {0}")]
    Network(String),

    #[error("invalid calendar URL: {0}")]
    InvalidUrl(String),

    #[error("unexpected calendar response: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    /// Events that were created before the failure, if any
    pub fn partial(&self) -> Option<&SyncReceipt> {
        match self {
            SyncError::Rejected { partial, .. } if partial.created > 0 => Some(partial),
            _ => None,
        }
    }
}

impl From<SyncError> for EngineError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Network(msg) => EngineError::Network(msg),
            other => EngineError::CalendarSync(other.to_string()),
        }
    }
}

/// What the calendar created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReceipt {
    pub created: usize,
    /// Browser links to the created events, when the calendar returns them
    pub links: Vec<String>,
}

#[async_trait]
pub trait CalendarSync: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Create every event of `artifact`, stopping at the first failure
    async fn sync(&self, artifact: &ScheduleArtifact) -> Result<SyncReceipt, SyncError>;

    /// Whether credentials for the backend are present
    async fn check_health(&self) -> bool {
        true
    }
}
