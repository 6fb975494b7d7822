//! Conversation loop
//!
//! One iteration: ask the router who speaks next, invoke that participant
//! (bounded by a timeout), append what it produced, advance the
//! last-selected pointer. The loop stops when the human has to answer, the
//! router terminates, the turn limit is hit, or the caller cancels.
//!
//! - Participant failures and timeouts become synthetic error turns; routing
//!   continues.
//! - More than `max_iterations` iterations without a new human turn is a
//!   non-convergence fault and fails the conversation.
//! - Cancellation is observed at the top of each iteration only.

use sdk::errors::EngineError;
use sdk::types::{Role, SessionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::gate::{Tool, ToolGate, ToolOutcome};
use super::router::{Decision, RoutingError, Rule, TurnRouter};
use super::transcript::TurnBody;
use super::{Conversation, TerminationReason};
use crate::calendar::GoogleCalendarClient;
use crate::config::{Config, ConversationConfig};
use crate::llm::router::LLMRouter;
use crate::participants::{CalendarSynchronizer, ModelParticipant, Participant, Reply};
use crate::secrets::SecretStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Turns appended in one run before the conversation completes; `None` for no limit
    pub max_turns: Option<usize>,
    /// Iterations allowed without a new human turn
    pub max_iterations: usize,
    pub participant_timeout: Duration,
}

impl LoopLimits {
    pub fn from_config(config: &ConversationConfig) -> Self {
        Self {
            max_turns: Some(config.max_turns),
            max_iterations: config.max_iterations,
            participant_timeout: Duration::from_secs(config.participant_timeout_secs),
        }
    }

    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("routing did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("no participant registered for role {0}")]
    MissingParticipant(Role),

    #[error("conversation {id} is already {status}")]
    Closed { id: String, status: SessionStatus },
}

impl From<LoopError> for EngineError {
    fn from(err: LoopError) -> Self {
        match err {
            LoopError::NonConvergence { iterations } => {
                EngineError::RoutingNonConvergence { iterations }
            }
            LoopError::Routing(e) => e.into(),
            LoopError::MissingParticipant(role) => EngineError::RoleNotInRoster(role.to_string()),
            LoopError::Closed { id, .. } => EngineError::SessionClosed(id),
        }
    }
}

/// Result of a single iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// `role` spoke and `appended` turns were added
    Advanced { role: Role, appended: usize },
    /// The human was selected and had nothing to say
    AwaitingHuman,
    Terminated(TerminationReason),
}

/// Why [`ConversationLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AwaitingHuman,
    Terminated(TerminationReason),
    Cancelled,
}

pub struct ConversationLoop {
    router: TurnRouter,
    gate: ToolGate,
    participants: HashMap<Role, Arc<dyn Participant>>,
    limits: LoopLimits,
}

impl ConversationLoop {
    pub fn new(
        router: TurnRouter,
        gate: ToolGate,
        participants: Vec<Arc<dyn Participant>>,
        limits: LoopLimits,
    ) -> Self {
        let participants = participants
            .into_iter()
            .map(|p| (p.role(), p))
            .collect();
        Self {
            router,
            gate,
            participants,
            limits,
        }
    }

    /// Standard wiring: model-backed Planner, Google Calendar synchronizer,
    /// and the given human.
    pub fn from_config(config: &Config, human: Arc<dyn Participant>, secrets: SecretStore) -> Self {
        let llm = Arc::new(LLMRouter::from_config(
            Arc::new(config.llm.clone()),
            secrets.clone(),
        ));
        let calendar = Arc::new(GoogleCalendarClient::new(&config.calendar, secrets));

        Self::new(
            TurnRouter::new(config.conversation.termination_token.clone()),
            ToolGate::new(calendar, config.conversation.timezone.clone()),
            vec![
                human,
                Arc::new(ModelParticipant::planner(llm, &config.conversation.timezone)),
                Arc::new(CalendarSynchronizer::new()),
            ],
            LoopLimits::from_config(&config.conversation),
        )
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Whether the router would hand the Planner another retry
    fn planner_keeps_floor(&self, conversation: &Conversation) -> bool {
        self.router
            .select(
                &conversation.transcript,
                &conversation.roster,
                conversation.last_selected,
            )
            .is_ok_and(|selection| selection.rule == Rule::KeepPlanner)
    }

    /// Run one routing iteration.
    pub async fn step(&self, conversation: &mut Conversation) -> Result<StepOutcome, LoopError> {
        let selection = self.router.select(
            &conversation.transcript,
            &conversation.roster,
            conversation.last_selected,
        )?;

        debug!(
            conversation = %conversation.id,
            rule = selection.rule.number(),
            selected = %selection.decision,
            "routing decision"
        );

        let role = match selection.decision {
            Decision::Terminate => return Ok(StepOutcome::Terminated(TerminationReason::Token)),
            Decision::Next(role) => role,
        };

        let participant = self
            .participants
            .get(&role)
            .ok_or(LoopError::MissingParticipant(role))?;

        let limit = participant.timeout(self.limits.participant_timeout);
        let response = match limit {
            Some(limit) => timeout(limit, participant.respond(&conversation.transcript)).await,
            None => Ok(participant.respond(&conversation.transcript).await),
        };

        let before = conversation.transcript.len();
        match response {
            Ok(Ok(Reply::Yield)) if role == Role::Human => return Ok(StepOutcome::AwaitingHuman),
            Ok(Ok(Reply::Yield)) => {}
            Ok(Ok(Reply::Message { text, tool_calls })) => {
                if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                    conversation.append(role, TurnBody::text(text));
                }

                let mut outcomes = Vec::with_capacity(tool_calls.len());
                for request in tool_calls {
                    let tool_name = Tool::from_name(&request.tool)
                        .map(|t| t.name().to_string())
                        .unwrap_or_else(|| request.tool.clone());

                    conversation.append(
                        role,
                        TurnBody::ToolCall {
                            call_id: request.call_id.clone(),
                            tool: tool_name,
                            arguments: request.arguments.clone(),
                        },
                    );

                    let outcome = self
                        .gate
                        .invoke(role, &request, &mut conversation.artifact)
                        .await;
                    conversation.append(role, result_turn(&request.call_id, &outcome));
                    outcomes.push(outcome);
                }

                if let Some(summary) = participant.summarize(&outcomes) {
                    conversation.append(role, TurnBody::text(summary));
                }
            }
            Ok(Err(e)) => {
                warn!(conversation = %conversation.id, "{} failed: {}", role, e);
                conversation.append(role, TurnBody::error(e.to_string()));
            }
            Err(_) => {
                let secs = limit.unwrap_or(self.limits.participant_timeout).as_secs();
                warn!(conversation = %conversation.id, "{} timed out after {}s", role, secs);
                conversation.append(
                    role,
                    TurnBody::error(format!("{} timed out after {}s", role, secs)),
                );
            }
        }

        conversation.last_selected = Some(role);
        Ok(StepOutcome::Advanced {
            role,
            appended: conversation.transcript.len() - before,
        })
    }

    /// Drive the conversation with the loop's own limits
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, LoopError> {
        self.run_with(conversation, cancel, self.limits).await
    }

    /// Drive the conversation until it needs the human, ends, or is cancelled.
    ///
    /// Status transitions are recorded on `conversation`; on error the
    /// transcript is left exactly as far as it got.
    pub async fn run_with(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
        limits: LoopLimits,
    ) -> Result<RunOutcome, LoopError> {
        if conversation.is_final() {
            return Err(LoopError::Closed {
                id: conversation.id.clone(),
                status: conversation.status,
            });
        }

        conversation.set_status(SessionStatus::Running);
        info!(conversation = %conversation.id, "conversation run started");

        let mut iterations = 0usize;
        let mut appended_total = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!(conversation = %conversation.id, "conversation cancelled");
                conversation.set_status(SessionStatus::Cancelled);
                return Ok(RunOutcome::Cancelled);
            }

            if iterations >= limits.max_iterations {
                let err = LoopError::NonConvergence { iterations };
                error!(conversation = %conversation.id, "{}", err);
                conversation.fail(err.to_string());
                return Err(err);
            }
            iterations += 1;

            let outcome = match self.step(conversation).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(conversation = %conversation.id, "conversation failed: {}", e);
                    conversation.fail(e.to_string());
                    return Err(e);
                }
            };

            match outcome {
                StepOutcome::Advanced { role, appended } => {
                    if role == Role::Human && appended > 0 {
                        iterations = 0;
                    }
                    appended_total += appended;
                    if limits.max_turns.is_some_and(|max| appended_total >= max) {
                        // A Planner still retrying at the limit never converged
                        if self.planner_keeps_floor(conversation) {
                            let err = LoopError::NonConvergence { iterations };
                            error!(
                                conversation = %conversation.id,
                                "turn limit reached while the planner was retrying: {}", err
                            );
                            conversation.fail(err.to_string());
                            return Err(err);
                        }
                        info!(conversation = %conversation.id, "turn limit reached");
                        conversation.complete(TerminationReason::MaxTurns);
                        return Ok(RunOutcome::Terminated(TerminationReason::MaxTurns));
                    }
                }
                StepOutcome::AwaitingHuman => {
                    conversation.set_status(SessionStatus::Pending);
                    return Ok(RunOutcome::AwaitingHuman);
                }
                StepOutcome::Terminated(reason) => {
                    info!(conversation = %conversation.id, "conversation terminated");
                    conversation.complete(reason);
                    return Ok(RunOutcome::Terminated(reason));
                }
            }
        }
    }
}

fn result_turn(call_id: &str, outcome: &ToolOutcome) -> TurnBody {
    TurnBody::ToolResult {
        call_id: call_id.to_string(),
        tool: outcome.tool.clone(),
        status: outcome.status,
        message: outcome.message.clone(),
        data: outcome.data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{CalendarSync, SyncError, SyncReceipt};
    use crate::conversation::Roster;
    use crate::participants::{DetachedHuman, ParticipantError};
    use crate::schedule::ScheduleArtifact;
    use async_trait::async_trait;
    use crate::conversation::transcript::Transcript;

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

    /// Planner that never says anything
    struct SilentPlanner;

    #[async_trait]
    impl Participant for SilentPlanner {
        fn role(&self) -> Role {
            Role::Planner
        }

        async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
            Ok(Reply::empty())
        }
    }

    /// Planner whose model is always down
    struct BrokenPlanner;

    #[async_trait]
    impl Participant for BrokenPlanner {
        fn role(&self) -> Role {
            Role::Planner
        }

        async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
            Err(ParticipantError::Input("model offline".to_string()))
        }
    }

    /// Planner that hangs
    struct SlowPlanner;

    #[async_trait]
    impl Participant for SlowPlanner {
        fn role(&self) -> Role {
            Role::Planner
        }

        async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Reply::text("too late"))
        }
    }

    /// Planner that keeps sending a schedule ending before it starts
    struct RetryingPlanner;

    #[async_trait]
    impl Participant for RetryingPlanner {
        fn role(&self) -> Role {
            Role::Planner
        }

        async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
            Ok(Reply::tool_call(crate::participants::ToolRequest::new(
                crate::conversation::gate::PERSIST_SCHEDULE,
                serde_json::json!({"events": [
                    {"title": "Math", "start": "2025-07-25T10:00:00", "end": "2025-07-25T09:00:00"}
                ]}),
            )))
        }
    }

    /// Human who needs longer than the participant timeout to answer
    struct SlowHuman;

    #[async_trait]
    impl Participant for SlowHuman {
        fn role(&self) -> Role {
            Role::Human
        }

        fn timeout(&self, _default: Duration) -> Option<Duration> {
            None
        }

        async fn respond(&self, _t: &Transcript) -> Result<Reply, ParticipantError> {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(Reply::text("math and physics"))
        }
    }

    fn limits() -> LoopLimits {
        LoopLimits {
            max_turns: Some(10),
            max_iterations: 5,
            participant_timeout: Duration::from_millis(200),
        }
    }

    fn engine(planner: Arc<dyn Participant>) -> ConversationLoop {
        engine_with(Arc::new(DetachedHuman), planner)
    }

    fn engine_with(human: Arc<dyn Participant>, planner: Arc<dyn Participant>) -> ConversationLoop {
        ConversationLoop::new(
            TurnRouter::new("EXIT"),
            ToolGate::new(Arc::new(NullCalendar), "Asia/Ho_Chi_Minh"),
            vec![
                human,
                planner,
                Arc::new(crate::participants::CalendarSynchronizer::new()),
            ],
            limits(),
        )
    }

    fn conversation_with(text: &str) -> Conversation {
        let mut conversation = Conversation::new(Roster::standard());
        conversation.append(Role::Human, TurnBody::text(text));
        conversation
    }

    #[tokio::test]
    async fn test_silent_planner_hits_iteration_ceiling() {
        let engine = engine(Arc::new(SilentPlanner));
        let mut conversation = conversation_with("plan my week");

        let err = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::NonConvergence { iterations: 5 }));
        assert_eq!(conversation.status, SessionStatus::Failed);
        assert_eq!(conversation.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_participant_error_becomes_error_turn() {
        let engine = engine(Arc::new(BrokenPlanner));
        let mut conversation = conversation_with("plan my week");

        let outcome = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::AwaitingHuman);
        assert_eq!(conversation.status, SessionStatus::Pending);

        let last = conversation.transcript.last().unwrap();
        assert_eq!(last.source, Role::Planner);
        assert!(matches!(&last.body, TurnBody::Error { message } if message.contains("model offline")));
    }

    #[tokio::test]
    async fn test_participant_timeout_becomes_error_turn() {
        let engine = engine(Arc::new(SlowPlanner));
        let mut conversation = conversation_with("plan my week");

        let outcome = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::AwaitingHuman);
        let last = conversation.transcript.last().unwrap();
        assert!(matches!(&last.body, TurnBody::Error { message } if message.contains("timed out")));
    }

    #[tokio::test]
    async fn test_termination_token_completes() {
        let engine = engine(Arc::new(SilentPlanner));
        let mut conversation = conversation_with("EXIT");

        let outcome = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Terminated(TerminationReason::Token));
        assert_eq!(conversation.status, SessionStatus::Completed);

        // A finished conversation cannot run again
        let err = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Closed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_first_iteration() {
        let engine = engine(Arc::new(SilentPlanner));
        let mut conversation = conversation_with("plan");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine.run(&mut conversation, &cancel).await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(conversation.status, SessionStatus::Cancelled);
        assert_eq!(conversation.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_turn_limit_completes_run() {
        let engine = engine(Arc::new(BrokenPlanner));
        let mut conversation = conversation_with("plan");

        let outcome = engine
            .run_with(
                &mut conversation,
                &CancellationToken::new(),
                limits().with_max_turns(Some(1)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Terminated(TerminationReason::MaxTurns));
        assert_eq!(conversation.termination, Some(TerminationReason::MaxTurns));
    }

    #[tokio::test]
    async fn test_turn_limit_during_planner_retries_is_non_convergence() {
        // 2 turns per retry: the turn limit (10) lands before the ceiling would
        let engine = engine(Arc::new(RetryingPlanner));
        let mut conversation = conversation_with("plan my week");

        let err = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::NonConvergence { iterations: 5 }));
        assert_eq!(conversation.status, SessionStatus::Failed);
        assert!(conversation.termination.is_none());
        assert_eq!(conversation.transcript.len(), 11);
    }

    #[tokio::test]
    async fn test_slow_human_is_not_timed_out() {
        let engine = engine_with(Arc::new(SlowHuman), Arc::new(SilentPlanner));
        let mut conversation = conversation_with("plan my week");
        conversation.append(Role::Planner, TurnBody::text("Which subjects?"));
        conversation.last_selected = Some(Role::Planner);

        let outcome = engine.step(&mut conversation).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Advanced {
                role: Role::Human,
                appended: 1
            }
        );
        let last = conversation.transcript.last().unwrap();
        assert_eq!(last.source, Role::Human);
        assert!(matches!(&last.body, TurnBody::Text { content } if content == "math and physics"));
        assert!(conversation
            .transcript
            .turns()
            .iter()
            .all(|t| !matches!(t.body, TurnBody::Error { .. })));
    }

    #[tokio::test]
    async fn test_missing_participant() {
        let engine = ConversationLoop::new(
            TurnRouter::new("EXIT"),
            ToolGate::new(Arc::new(NullCalendar), "UTC"),
            vec![Arc::new(DetachedHuman)],
            limits(),
        );
        let mut conversation = conversation_with("plan");
        let err = engine
            .run(&mut conversation, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::MissingParticipant(Role::Planner)));
        assert_eq!(conversation.status, SessionStatus::Failed);
    }
}
