//! Integration tests for the session layer
//!
//! A gated Planner holds a run open so concurrent calls can be observed.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use cadence_engine::calendar::{CalendarSync, SyncError, SyncReceipt};
use cadence_engine::config::Config;
use cadence_engine::conversation::gate::PERSIST_SCHEDULE;
use cadence_engine::conversation::{
    ConversationLoop, LoopLimits, ToolGate, Transcript, TurnKind, TurnRouter,
};
use cadence_engine::participants::{
    CalendarSynchronizer, DetachedHuman, Participant, ParticipantError, Reply, ToolRequest,
};
use cadence_engine::schedule::ScheduleArtifact;
use cadence_engine::session::{CycleOutcome, InMemorySessionStore, SessionError, SessionManager};
use sdk::types::{Role, SessionStatus};

struct NullCalendar;

#[async_trait]
impl CalendarSync for NullCalendar {
    fn name(&self) -> &str {
        "null"
    }

    async fn sync(&self, artifact: &ScheduleArtifact) -> Result<SyncReceipt, SyncError> {
        Ok(SyncReceipt {
            created: artifact.len(),
            links: vec![],
        })
    }
}

/// Planner that answers only once `release` is notified
struct GatedPlanner {
    release: Arc<Notify>,
}

#[async_trait]
impl Participant for GatedPlanner {
    fn role(&self) -> Role {
        Role::Planner
    }

    async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
        self.release.notified().await;
        Ok(Reply::text("What would you like to study?"))
    }
}

fn manager(release: Arc<Notify>) -> Arc<SessionManager> {
    let engine = ConversationLoop::new(
        TurnRouter::new("EXIT"),
        ToolGate::new(Arc::new(NullCalendar), "Asia/Ho_Chi_Minh"),
        vec![
            Arc::new(DetachedHuman),
            Arc::new(GatedPlanner { release }),
            Arc::new(CalendarSynchronizer::new()),
        ],
        LoopLimits {
            max_turns: None,
            max_iterations: 10,
            participant_timeout: Duration::from_secs(5),
        },
    );
    Arc::new(SessionManager::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(engine),
    ))
}

async fn wait_until_running(manager: &SessionManager, id: &str) {
    for _ in 0..200 {
        if manager.is_running(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("conversation {} never started running", id);
}

#[tokio::test]
async fn test_cycle_appends_planner_reply() {
    let release = Arc::new(Notify::new());
    let manager = manager(release.clone());
    release.notify_one();

    let id = manager.create_conversation().await.unwrap();
    assert_eq!(manager.get_status(&id).await.unwrap(), SessionStatus::Pending);

    let seq = manager.append_human_turn(&id, "Plan my week").await.unwrap();
    assert_eq!(seq, 1);

    let report = manager.run_cycle(&id).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::AwaitingHuman);
    assert_eq!(report.status, SessionStatus::Pending);
    assert_eq!(report.new_turns.len(), 1);
    assert_eq!(report.new_turns[0].source, Role::Planner);
    assert!(report.error.is_none());

    let transcript = manager.get_transcript(&id).await.unwrap();
    assert_eq!(transcript.len(), 2);
}

#[tokio::test]
async fn test_second_caller_is_busy_while_running() {
    let release = Arc::new(Notify::new());
    let manager = manager(release.clone());

    let id = manager.create_conversation().await.unwrap();
    manager.append_human_turn(&id, "Plan my week").await.unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        tokio::spawn(async move { manager.run_cycle(&id).await })
    };
    wait_until_running(&manager, &id).await;

    assert!(matches!(
        manager.append_human_turn(&id, "hello?").await,
        Err(SessionError::Busy(_))
    ));
    assert!(matches!(
        manager.run_cycle(&id).await,
        Err(SessionError::Busy(_))
    ));

    release.notify_one();
    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.outcome, CycleOutcome::AwaitingHuman);
    assert!(!manager.is_running(&id));

    // Free again once the run is over
    manager.append_human_turn(&id, "Math, please").await.unwrap();
}

#[tokio::test]
async fn test_cancel_stops_running_conversation() {
    let release = Arc::new(Notify::new());
    let manager = manager(release.clone());

    let id = manager.create_conversation().await.unwrap();
    manager.append_human_turn(&id, "Plan my week").await.unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        tokio::spawn(async move { manager.run_cycle(&id).await })
    };
    wait_until_running(&manager, &id).await;

    assert!(manager.cancel(&id).await.unwrap());
    release.notify_one();

    let report = runner.await.unwrap().unwrap();
    assert_eq!(report.outcome, CycleOutcome::Cancelled);
    assert_eq!(report.status, SessionStatus::Cancelled);
    // The in-flight Planner reply is kept
    assert_eq!(report.new_turns.len(), 1);

    assert_eq!(
        manager.get_status(&id).await.unwrap(),
        SessionStatus::Cancelled
    );
    assert!(matches!(
        manager.append_human_turn(&id, "again").await,
        Err(SessionError::Closed { .. })
    ));
    assert!(!manager.cancel(&id).await.unwrap());
}

#[tokio::test]
async fn test_cancel_idle_conversation() {
    let manager = manager(Arc::new(Notify::new()));
    let id = manager.create_conversation().await.unwrap();

    assert!(manager.cancel(&id).await.unwrap());
    assert_eq!(
        manager.get_status(&id).await.unwrap(),
        SessionStatus::Cancelled
    );
    assert!(matches!(
        manager.run_cycle(&id).await,
        Err(SessionError::Closed { .. })
    ));
}

#[tokio::test]
async fn test_delete_while_running_does_not_resurrect() {
    let release = Arc::new(Notify::new());
    let manager = manager(release.clone());

    let id = manager.create_conversation().await.unwrap();
    manager.append_human_turn(&id, "Plan my week").await.unwrap();

    let runner = {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        tokio::spawn(async move { manager.run_cycle(&id).await })
    };
    wait_until_running(&manager, &id).await;

    assert!(manager.delete(&id).await.unwrap());
    release.notify_one();

    assert!(matches!(
        runner.await.unwrap(),
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        manager.get(&id).await,
        Err(SessionError::NotFound(_))
    ));
    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_runs_in_background() {
    let release = Arc::new(Notify::new());
    let manager = manager(release.clone());

    let id = manager.submit("Two weeks to learn Rust", None).await.unwrap();
    let transcript = manager.get_transcript(&id).await.unwrap();
    assert_eq!(transcript.turns()[0].source, Role::Human);

    wait_until_running(&manager, &id).await;
    release.notify_one();

    for _ in 0..200 {
        if !manager.is_running(&id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let conversation = manager.get(&id).await.unwrap();
    assert_eq!(conversation.status, SessionStatus::Pending);
    assert_eq!(conversation.transcript.len(), 2);
    assert_eq!(
        conversation.transcript.last().unwrap().body.kind(),
        TurnKind::Text
    );

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].turns, 2);
}

#[tokio::test]
async fn test_unknown_conversation() {
    let manager = manager(Arc::new(Notify::new()));
    assert!(matches!(
        manager.run_cycle("missing").await,
        Err(SessionError::NotFound(_))
    ));
    assert!(!manager.delete("missing").await.unwrap());
}

/// Planner that sends `bad_attempts` invalid schedules before a valid one
struct EventuallyValidPlanner {
    bad_attempts: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Participant for EventuallyValidPlanner {
    fn role(&self) -> Role {
        Role::Planner
    }

    async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let end = if call < self.bad_attempts {
            "2025-07-25T07:00:00"
        } else {
            "2025-07-25T09:30:00"
        };
        Ok(Reply::tool_call(ToolRequest::new(
            PERSIST_SCHEDULE,
            json!({"events": [{"title": "Math", "start": "2025-07-25T08:00:00", "end": end}]}),
        )))
    }
}

fn default_config_manager(bad_attempts: usize) -> Arc<SessionManager> {
    let engine = ConversationLoop::new(
        TurnRouter::new("EXIT"),
        ToolGate::new(Arc::new(NullCalendar), "Asia/Ho_Chi_Minh"),
        vec![
            Arc::new(DetachedHuman),
            Arc::new(EventuallyValidPlanner {
                bad_attempts,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(CalendarSynchronizer::new()),
        ],
        LoopLimits::from_config(&Config::default().conversation),
    );
    Arc::new(SessionManager::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(engine),
    ))
}

#[tokio::test]
async fn test_long_cycle_with_default_config_stays_open() {
    // Five rejected drafts, then persist and sync: 15 turns in one cycle
    let manager = default_config_manager(5);
    let id = manager.create_conversation().await.unwrap();
    manager.append_human_turn(&id, "Math tomorrow 8-9:30").await.unwrap();

    let report = manager.run_cycle(&id).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::AwaitingHuman);
    assert_eq!(report.status, SessionStatus::Pending);
    assert_eq!(report.new_turns.len(), 15);
    assert_eq!(report.new_turns.last().unwrap().source, Role::Synchronizer);

    // The session still takes input
    manager.append_human_turn(&id, "Thanks").await.unwrap();
}

#[tokio::test]
async fn test_stuck_planner_with_default_config_fails() {
    let manager = default_config_manager(usize::MAX);
    let id = manager.create_conversation().await.unwrap();
    manager.append_human_turn(&id, "Math tomorrow 8-9:30").await.unwrap();

    let report = manager.run_cycle(&id).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::Failed);
    assert_eq!(report.status, SessionStatus::Failed);
    assert!(report.error.unwrap().contains("did not converge"));

    let conversation = manager.get(&id).await.unwrap();
    assert!(conversation.termination.is_none());
    // Every rejected attempt is still in the stored history
    assert_eq!(conversation.transcript.len(), 1 + 2 * 25);
}

#[tokio::test]
async fn test_task_uses_configured_turn_limit() {
    let manager = default_config_manager(usize::MAX);
    let id = manager.submit("Math tomorrow 8-9:30", None).await.unwrap();

    for _ in 0..200 {
        if manager.get_status(&id).await.unwrap().is_final() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The limit of 10 lands mid-retry, which is a failure, not a completion
    let conversation = manager.get(&id).await.unwrap();
    assert_eq!(conversation.status, SessionStatus::Failed);
    assert_eq!(conversation.transcript.len(), 11);
}
