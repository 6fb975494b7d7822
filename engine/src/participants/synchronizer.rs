//! Deterministic calendar synchronizer
//!
//! Never consults a model. Whenever it gets the floor it requests exactly one
//! `sync_to_calendar` call, then reports the outcome as a status line.

use async_trait::async_trait;
use sdk::types::Role;
use serde_json::json;

use super::{Participant, ParticipantError, Reply, ToolRequest};
use crate::conversation::gate::{ToolOutcome, SYNC_TO_CALENDAR};
use crate::conversation::transcript::Transcript;

pub const SYNC_SUCCESS_TEXT: &str = "✅ Study plan synced to Google Calendar.";
pub const SYNC_FAILURE_TEXT: &str = "❌ Failed to sync study plan to Google Calendar.";

const SYNCHRONIZER_TOOLS: &[&str] = &[SYNC_TO_CALENDAR];

#[derive(Debug, Default)]
pub struct CalendarSynchronizer;

impl CalendarSynchronizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Participant for CalendarSynchronizer {
    fn role(&self) -> Role {
        Role::Synchronizer
    }

    fn tools(&self) -> &[&'static str] {
        SYNCHRONIZER_TOOLS
    }

    async fn respond(&self, _transcript: &Transcript) -> Result<Reply, ParticipantError> {
        Ok(Reply::tool_call(ToolRequest::new(SYNC_TO_CALENDAR, json!({}))))
    }

    fn summarize(&self, outcomes: &[ToolOutcome]) -> Option<String> {
        let outcome = outcomes.iter().find(|o| o.tool == SYNC_TO_CALENDAR)?;

        let mut text = if outcome.is_success() {
            SYNC_SUCCESS_TEXT.to_string()
        } else {
            let reason = outcome.message.trim_start_matches("❌").trim();
            let mut text = format!("{} {}", SYNC_FAILURE_TEXT, reason);
            let created = outcome
                .data
                .as_ref()
                .and_then(|d| d.get("created"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0);
            if created > 0 {
                text.push_str(&format!(
                    "\n{} event(s) were created before the failure and remain in the calendar.",
                    created
                ));
            }
            text
        };

        for link in links(outcome) {
            text.push_str("\n📅 ");
            text.push_str(link);
        }
        Some(text)
    }
}

fn links(outcome: &ToolOutcome) -> Vec<&str> {
    outcome
        .data
        .as_ref()
        .and_then(|d| d.get("links"))
        .and_then(|l| l.as_array())
        .map(|links| links.iter().filter_map(|l| l.as_str()).collect())
        .unwrap_or_default()
}
