//! Turn router
//!
//! Picks the next participant from the transcript, the roster and the
//! previously selected role. Rules are checked in a fixed order and the
//! first match wins:
//!
//! | # | Condition                                              | Selects      |
//! |---|--------------------------------------------------------|--------------|
//! | T | latest human turn contains the termination token       | terminate    |
//! | 1 | empty transcript, or the last turn is human text       | Planner      |
//! | 3 | last turn is the Planner's successful persist result   | Synchronizer |
//! | 2 | Planner holds the floor mid tool exchange              | Planner      |
//! | 4 | last turn came from the Synchronizer                   | Human        |
//! | 5 | anything else                                          | Human        |
//!
//! Rule 3 is evaluated ahead of rule 2 so an accepted artifact always moves to
//! the Synchronizer. The router holds no state; the same inputs always give the
//! same selection.

use sdk::errors::EngineError;
use sdk::types::Role;
use serde::Serialize;
use std::fmt;

use super::gate::PERSIST_SCHEDULE;
use super::roster::Roster;
use super::transcript::{ToolStatus, Transcript, TurnBody};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("role {0} is not in the roster")]
    RoleNotInRoster(Role),

    #[error("invalid roster: {0}")]
    InvalidRoster(String),
}

impl From<RoutingError> for EngineError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::RoleNotInRoster(role) => EngineError::RoleNotInRoster(role.to_string()),
            RoutingError::InvalidRoster(msg) => EngineError::InvalidRoster(msg),
        }
    }
}

/// Which rule produced a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Termination,
    NewRequest,
    KeepPlanner,
    ArtifactReady,
    SyncFinished,
    Fallback,
}

impl Rule {
    /// Rule number as used in logs; termination is 6
    pub fn number(&self) -> u8 {
        match self {
            Rule::NewRequest => 1,
            Rule::KeepPlanner => 2,
            Rule::ArtifactReady => 3,
            Rule::SyncFinished => 4,
            Rule::Fallback => 5,
            Rule::Termination => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Next(Role),
    Terminate,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Next(role) => write!(f, "{}", role),
            Decision::Terminate => f.write_str("terminate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub decision: Decision,
    pub rule: Rule,
}

impl Selection {
    fn next(role: Role, rule: Rule) -> Self {
        Self {
            decision: Decision::Next(role),
            rule,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRouter {
    termination_token: String,
}

impl TurnRouter {
    pub fn new(termination_token: impl Into<String>) -> Self {
        Self {
            termination_token: termination_token.into(),
        }
    }

    pub fn termination_token(&self) -> &str {
        &self.termination_token
    }

    /// Select the next participant, or terminate.
    pub fn select(
        &self,
        transcript: &Transcript,
        roster: &Roster,
        last_selected: Option<Role>,
    ) -> Result<Selection, RoutingError> {
        let selection = self.evaluate(transcript, last_selected);

        if let Decision::Next(role) = selection.decision {
            if !roster.contains(role) {
                return Err(RoutingError::RoleNotInRoster(role));
            }
        }

        Ok(selection)
    }

    fn evaluate(&self, transcript: &Transcript, last_selected: Option<Role>) -> Selection {
        if self.termination_requested(transcript) {
            return Selection {
                decision: Decision::Terminate,
                rule: Rule::Termination,
            };
        }

        let last = match transcript.last() {
            Some(turn) => turn,
            None => return Selection::next(Role::Planner, Rule::NewRequest),
        };

        match (last.source, &last.body) {
            (Role::Human, TurnBody::Text { .. }) => {
                Selection::next(Role::Planner, Rule::NewRequest)
            }

            (Role::Planner, _) if last.is_successful_result_of(PERSIST_SCHEDULE) => {
                Selection::next(Role::Synchronizer, Rule::ArtifactReady)
            }

            (Role::Planner, TurnBody::ToolCall { .. })
            | (
                Role::Planner,
                TurnBody::ToolResult {
                    status: ToolStatus::Failure,
                    ..
                },
            ) if last_selected == Some(Role::Planner) && !persisted_this_cycle(transcript) => {
                Selection::next(Role::Planner, Rule::KeepPlanner)
            }

            (Role::Synchronizer, _) => Selection::next(Role::Human, Rule::SyncFinished),

            _ => Selection::next(Role::Human, Rule::Fallback),
        }
    }

    /// Case-sensitive substring match on the latest human text turn
    fn termination_requested(&self, transcript: &Transcript) -> bool {
        transcript
            .latest_from(Role::Human)
            .and_then(|turn| turn.text())
            .map(|text| text.contains(self.termination_token.as_str()))
            .unwrap_or(false)
    }
}

fn persisted_this_cycle(transcript: &Transcript) -> bool {
    transcript
        .current_cycle()
        .iter()
        .any(|t| t.source == Role::Planner && t.is_successful_result_of(PERSIST_SCHEDULE))
}
