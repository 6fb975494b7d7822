//! Session layer
//!
//! [`SessionManager`] is the boundary the CLI and HTTP adapter talk to. It
//! loads a conversation from the [`SessionStore`], drives it with the shared
//! [`ConversationLoop`], and writes it back. At most one run per conversation
//! is in flight; a second caller gets `Busy`.

use sdk::errors::EngineError;
use sdk::types::SessionStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::conversation::{
    Conversation, ConversationLoop, LoopError, Roster, RunOutcome, TerminationReason, Transcript,
    Turn, TurnBody,
};
use sdk::types::Role;

pub mod store;

pub use store::{ConversationSummary, InMemorySessionStore, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} is already running")]
    Busy(String),

    #[error("session {id} is {status}")]
    Closed { id: String, status: SessionStatus },

    #[error("session store failure: {0}")]
    Store(String),
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => EngineError::SessionNotFound(id),
            SessionError::Busy(id) => EngineError::SessionBusy(id),
            SessionError::Closed { id, .. } => EngineError::SessionClosed(id),
            SessionError::Store(msg) => {
                EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, msg))
            }
        }
    }
}

/// How one routing cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    AwaitingHuman,
    Terminated { reason: TerminationReason },
    Cancelled,
    Failed,
}

/// What a caller gets back from [`SessionManager::run_cycle`]
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    pub status: SessionStatus,
    /// Turns appended during this cycle
    pub new_turns: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

type RunningMap = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Marks a conversation as running until dropped
struct RunGuard {
    running: RunningMap,
    id: String,
    token: CancellationToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.id);
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    engine: Arc<ConversationLoop>,
    running: RunningMap,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<ConversationLoop>) -> Self {
        Self {
            store,
            engine,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn claim(&self, id: &str) -> Result<RunGuard, SessionError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.contains_key(id) {
            return Err(SessionError::Busy(id.to_string()));
        }
        let token = CancellationToken::new();
        running.insert(id.to_string(), token.clone());
        Ok(RunGuard {
            running: self.running.clone(),
            id: id.to_string(),
            token,
        })
    }

    pub fn is_running(&self, id: &str) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.contains_key(id)
    }

    async fn load(&self, id: &str) -> Result<Conversation, SessionError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Start a conversation with the standard roster and return its id
    pub async fn create_conversation(&self) -> Result<String, SessionError> {
        let conversation = Conversation::new(Roster::standard());
        let id = conversation.id.clone();
        self.store.put(conversation).await?;
        info!(conversation = %id, "conversation created");
        Ok(id)
    }

    /// Append a human text turn; returns its sequence number
    pub async fn append_human_turn(&self, id: &str, text: &str) -> Result<u64, SessionError> {
        let _guard = self.claim(id)?;
        let mut conversation = self.load(id).await?;
        if conversation.is_final() {
            return Err(SessionError::Closed {
                id: id.to_string(),
                status: conversation.status,
            });
        }

        let seq = conversation.append(Role::Human, TurnBody::text(text));
        self.store.put(conversation).await?;
        Ok(seq)
    }

    /// Drive the conversation until it awaits the human, ends, or is cancelled.
    ///
    /// Interactive cycles have no turn limit; the iteration ceiling still
    /// applies, so a stuck Planner fails the conversation instead of closing it.
    pub async fn run_cycle(&self, id: &str) -> Result<CycleReport, SessionError> {
        self.run_cycle_with(id, None).await
    }

    /// Like [`SessionManager::run_cycle`] with a per-run turn limit (`None` for none)
    pub async fn run_cycle_with(
        &self,
        id: &str,
        max_turns: Option<usize>,
    ) -> Result<CycleReport, SessionError> {
        let guard = self.claim(id)?;
        let mut conversation = self.load(id).await?;
        if conversation.is_final() {
            return Err(SessionError::Closed {
                id: id.to_string(),
                status: conversation.status,
            });
        }

        let before = conversation.transcript.last_seq();
        conversation.set_status(SessionStatus::Running);
        self.store.put(conversation.clone()).await?;

        let limits = self.engine.limits().with_max_turns(max_turns);

        let result = self
            .engine
            .run_with(&mut conversation, &guard.token, limits)
            .await;

        // Deleted while running: do not resurrect it
        if guard.token.is_cancelled() && self.store.get(id).await?.is_none() {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let outcome = match &result {
            Ok(RunOutcome::AwaitingHuman) => CycleOutcome::AwaitingHuman,
            Ok(RunOutcome::Terminated(reason)) => CycleOutcome::Terminated { reason: *reason },
            Ok(RunOutcome::Cancelled) => CycleOutcome::Cancelled,
            Err(e) => {
                warn!(conversation = %id, "run failed: {}", e);
                CycleOutcome::Failed
            }
        };

        let report = CycleReport {
            id: id.to_string(),
            outcome,
            status: conversation.status,
            new_turns: conversation.transcript.since(before).to_vec(),
            error: result.as_ref().err().map(LoopError::to_string),
        };

        self.store.put(conversation).await?;
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Result<Conversation, SessionError> {
        self.load(id).await
    }

    pub async fn get_transcript(&self, id: &str) -> Result<Transcript, SessionError> {
        Ok(self.load(id).await?.transcript)
    }

    pub async fn get_status(&self, id: &str) -> Result<SessionStatus, SessionError> {
        Ok(self.load(id).await?.status)
    }

    /// Request cancellation. A running conversation stops at its next
    /// iteration boundary; an idle one is marked cancelled immediately.
    /// Returns false when the conversation had already finished.
    pub async fn cancel(&self, id: &str) -> Result<bool, SessionError> {
        let token = {
            let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.get(id).cloned()
        };
        if let Some(token) = token {
            token.cancel();
            return Ok(true);
        }

        let mut conversation = self.load(id).await?;
        if conversation.is_final() {
            return Ok(false);
        }
        conversation.set_status(SessionStatus::Cancelled);
        self.store.put(conversation).await?;
        info!(conversation = %id, "conversation cancelled");
        Ok(true)
    }

    /// Cancel and remove; returns whether the conversation existed
    pub async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        if let Some(token) = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            token.cancel();
        }
        self.store.delete(id).await
    }

    pub async fn list(&self) -> Result<Vec<ConversationSummary>, SessionError> {
        self.store.list().await
    }

    /// Create a conversation from a single request and run it in the background.
    ///
    /// `max_turns` falls back to the engine's configured limit. Returns the id
    /// immediately; poll [`SessionManager::get`] for progress.
    pub async fn submit(
        self: &Arc<Self>,
        request: &str,
        max_turns: Option<usize>,
    ) -> Result<String, SessionError> {
        let max_turns = max_turns.or(self.engine.limits().max_turns);
        let id = self.create_conversation().await?;
        self.append_human_turn(&id, request).await?;

        let manager = Arc::clone(self);
        let task_id = id.clone();
        tokio::spawn(async move {
            match manager.run_cycle_with(&task_id, max_turns).await {
                Ok(report) => info!(
                    conversation = %task_id,
                    "background run finished: {}",
                    report.status
                ),
                Err(e) => warn!(conversation = %task_id, "background run failed: {}", e),
            }
        });

        Ok(id)
    }
}
