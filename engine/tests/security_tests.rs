//! Tool permission and secret hygiene checks

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadence_engine::calendar::{CalendarSync, SyncError, SyncReceipt};
use cadence_engine::conversation::gate::{Tool, PERSIST_SCHEDULE, SYNC_TO_CALENDAR};
use cadence_engine::conversation::{ToolGate, ToolStatus};
use cadence_engine::participants::ToolRequest;
use cadence_engine::schedule::ScheduleArtifact;
use sdk::types::Role;

#[derive(Default)]
struct CountingCalendar {
    calls: AtomicUsize,
}

#[async_trait]
impl CalendarSync for CountingCalendar {
    fn name(&self) -> &str {
        "counting"
    }

    async fn sync(&self, artifact: &ScheduleArtifact) -> Result<SyncReceipt, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SyncReceipt {
            created: artifact.len(),
            links: vec![],
        })
    }
}

fn schedule() -> serde_json::Value {
    json!({"events": [{"summary": "Math", "start": "2025-07-25T08:00:00", "end": "2025-07-25T09:00:00"}]})
}

#[test]
fn test_each_tool_has_exactly_one_owner() {
    let gate = ToolGate::new(Arc::new(CountingCalendar::default()), "UTC");

    for role in Role::ALL {
        for name in [PERSIST_SCHEDULE, "save_schedule_json"] {
            assert_eq!(gate.authorize(role, name).is_ok(), role == Role::Planner);
        }
        for name in [SYNC_TO_CALENDAR, "load_schedule_json"] {
            assert_eq!(
                gate.authorize(role, name).is_ok(),
                role == Role::Synchronizer
            );
        }
        assert!(gate.authorize(role, "delete_calendar").is_err());
    }

    assert_eq!(Tool::from_name(" save_schedule_json "), Some(Tool::PersistSchedule));
}

#[tokio::test]
async fn test_unauthorized_calls_have_no_side_effects() {
    let calendar = Arc::new(CountingCalendar::default());
    let gate = ToolGate::new(calendar.clone(), "UTC");
    let mut slot = None;

    // Human cannot persist
    let outcome = gate
        .invoke(
            Role::Human,
            &ToolRequest::new(PERSIST_SCHEDULE, schedule()),
            &mut slot,
        )
        .await;
    assert_eq!(outcome.status, ToolStatus::Failure);
    assert!(outcome.message.starts_with("❌"));
    assert!(slot.is_none());

    // Planner persists, then tries to sync itself
    gate.invoke(
        Role::Planner,
        &ToolRequest::new(PERSIST_SCHEDULE, schedule()),
        &mut slot,
    )
    .await;
    assert!(slot.is_some());

    let outcome = gate
        .invoke(
            Role::Planner,
            &ToolRequest::new(SYNC_TO_CALENDAR, json!({})),
            &mut slot,
        )
        .await;
    assert_eq!(outcome.status, ToolStatus::Failure);
    assert!(slot.is_some(), "artifact stays for the Synchronizer");
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 0);

    // Unknown tools keep the requested name in the outcome
    let outcome = gate
        .invoke(
            Role::Synchronizer,
            &ToolRequest::new("drop_table", json!({})),
            &mut slot,
        )
        .await;
    assert_eq!(outcome.tool, "drop_table");
    assert_eq!(outcome.status, ToolStatus::Failure);
}

#[tokio::test]
async fn test_sync_without_artifact_fails_without_calendar_call() {
    let calendar = Arc::new(CountingCalendar::default());
    let gate = ToolGate::new(calendar.clone(), "UTC");
    let mut slot = None;

    let outcome = gate
        .invoke(
            Role::Synchronizer,
            &ToolRequest::new(SYNC_TO_CALENDAR, json!({})),
            &mut slot,
        )
        .await;

    assert_eq!(outcome.status, ToolStatus::Failure);
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 0);
}
