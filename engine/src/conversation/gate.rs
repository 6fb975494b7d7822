//! Tool-invocation gate
//!
//! Decides which role may call which side-effecting tool and runs the call:
//!
//! - Planner: `persist_schedule` (alias `save_schedule_json`) validates the
//!   artifact and stores it in the conversation's artifact slot.
//! - Synchronizer: `sync_to_calendar` (alias `load_schedule_json`) takes the
//!   stored artifact and pushes it to the calendar.
//!
//! Every failure comes back as a [`ToolOutcome`] with `Failure` status; none of
//! them end the conversation.

use sdk::errors::EngineError;
use sdk::types::Role;
use serde_json::{json, Value};
use std::sync::Arc;

use super::transcript::ToolStatus;
use crate::calendar::{CalendarSync, SyncError};
use crate::participants::ToolRequest;
use crate::schedule::{ScheduleArtifact, ScheduleError};

pub const PERSIST_SCHEDULE: &str = "persist_schedule";
pub const SYNC_TO_CALENDAR: &str = "sync_to_calendar";

/// Result text of an accepted artifact
pub const PERSIST_OK: &str = "✅ JSON SAVED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    PersistSchedule,
    SyncToCalendar,
}

impl Tool {
    /// Resolve a tool name, accepting the legacy names
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            PERSIST_SCHEDULE | "save_schedule_json" => Some(Tool::PersistSchedule),
            SYNC_TO_CALENDAR | "load_schedule_json" => Some(Tool::SyncToCalendar),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::PersistSchedule => PERSIST_SCHEDULE,
            Tool::SyncToCalendar => SYNC_TO_CALENDAR,
        }
    }

    /// The only role allowed to call this tool
    pub fn owner(&self) -> Role {
        match self {
            Tool::PersistSchedule => Role::Planner,
            Tool::SyncToCalendar => Role::Synchronizer,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("{role} may not call {tool}")]
    NotPermitted { role: Role, tool: &'static str },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error(transparent)]
    Validation(#[from] ScheduleError),

    #[error("no schedule has been persisted yet")]
    MissingArtifact,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<GateError> for EngineError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::NotPermitted { role, tool } => EngineError::ToolNotPermitted {
                role: role.to_string(),
                tool: tool.to_string(),
            },
            GateError::UnknownTool(name) => EngineError::UnknownTool(name),
            GateError::Validation(e) => e.into(),
            GateError::MissingArtifact => EngineError::ArtifactMissing,
            GateError::Sync(e) => e.into(),
        }
    }
}

/// What the gate reports back for one call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Canonical tool name, or the requested name when unknown
    pub tool: String,
    pub status: ToolStatus,
    pub message: String,
    pub data: Option<Value>,
}

impl ToolOutcome {
    fn success(tool: Tool, message: impl Into<String>, data: Value) -> Self {
        Self {
            tool: tool.name().to_string(),
            status: ToolStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    fn failure(tool: String, err: &GateError) -> Self {
        // A sync that failed halfway still reports what it created
        let data = match err {
            GateError::Sync(e) => e
                .partial()
                .map(|receipt| json!({ "created": receipt.created, "links": receipt.links })),
            _ => None,
        };
        Self {
            tool,
            status: ToolStatus::Failure,
            message: format!("❌ {}", err),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

pub struct ToolGate {
    calendar: Arc<dyn CalendarSync>,
    default_timezone: String,
}

impl ToolGate {
    pub fn new(calendar: Arc<dyn CalendarSync>, default_timezone: impl Into<String>) -> Self {
        Self {
            calendar,
            default_timezone: default_timezone.into(),
        }
    }

    /// Check that `role` may call `tool_name`
    pub fn authorize(&self, role: Role, tool_name: &str) -> Result<Tool, GateError> {
        let tool = Tool::from_name(tool_name)
            .ok_or_else(|| GateError::UnknownTool(tool_name.to_string()))?;
        if tool.owner() != role {
            return Err(GateError::NotPermitted {
                role,
                tool: tool.name(),
            });
        }
        Ok(tool)
    }

    /// Run one call on behalf of `role` against the conversation's artifact slot
    pub async fn invoke(
        &self,
        role: Role,
        request: &ToolRequest,
        slot: &mut Option<ScheduleArtifact>,
    ) -> ToolOutcome {
        let canonical = Tool::from_name(&request.tool)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| request.tool.clone());

        let result = match self.authorize(role, &request.tool) {
            Ok(Tool::PersistSchedule) => self.persist(&request.arguments, slot),
            Ok(Tool::SyncToCalendar) => self.sync(slot).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("{} call to {} failed: {}", role, canonical, e);
                ToolOutcome::failure(canonical, &e)
            }
        }
    }

    fn persist(
        &self,
        arguments: &Value,
        slot: &mut Option<ScheduleArtifact>,
    ) -> Result<ToolOutcome, GateError> {
        let artifact = ScheduleArtifact::from_arguments(arguments, &self.default_timezone)?;
        tracing::info!("Schedule persisted with {} event(s)", artifact.len());

        let data = artifact.to_json();
        *slot = Some(artifact);
        Ok(ToolOutcome::success(Tool::PersistSchedule, PERSIST_OK, data))
    }

    async fn sync(&self, slot: &mut Option<ScheduleArtifact>) -> Result<ToolOutcome, GateError> {
        // Consumed whether or not the calendar accepts it
        let artifact = slot.take().ok_or(GateError::MissingArtifact)?;

        let receipt = self.calendar.sync(&artifact).await?;
        tracing::info!(
            "Synced {} event(s) via {}",
            receipt.created,
            self.calendar.name()
        );

        Ok(ToolOutcome::success(
            Tool::SyncToCalendar,
            format!("✅ Synced {} event(s)", receipt.created),
            json!({ "created": receipt.created, "links": receipt.links }),
        ))
    }
}
