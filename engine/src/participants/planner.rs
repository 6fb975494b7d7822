//! Model-backed participant (the Planner)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sdk::types::Role;
use serde_json::json;
use std::sync::Arc;

use super::{Participant, ParticipantError, Reply, ToolRequest};
use crate::conversation::gate::PERSIST_SCHEDULE;
use crate::conversation::transcript::{Transcript, TurnBody};
use crate::llm::router::LLMRouter;
use crate::llm::{LLMResponse, Message};

const PLANNER_TOOLS: &[&str] = &[PERSIST_SCHEDULE];

/// A participant whose turns come from a language model.
///
/// The transcript is rendered from this participant's point of view: its own
/// turns become assistant messages, everyone else's text becomes user messages.
/// The system message ends with the wall-clock time in `timezone`, taken
/// fresh on every render.
pub struct ModelParticipant {
    role: Role,
    instruction: String,
    timezone: Tz,
    tools: &'static [&'static str],
    router: Arc<LLMRouter>,
}

impl ModelParticipant {
    pub fn new(
        role: Role,
        instruction: impl Into<String>,
        tools: &'static [&'static str],
        router: Arc<LLMRouter>,
    ) -> Self {
        Self {
            role,
            instruction: instruction.into(),
            timezone: Tz::UTC,
            tools,
            router,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// The study planner, declaring `persist_schedule`
    pub fn planner(router: Arc<LLMRouter>, timezone: &str) -> Self {
        let tz = timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!("Unknown timezone '{}', planner clock falls back to UTC", timezone);
            Tz::UTC
        });
        Self::new(
            Role::Planner,
            planner_instruction(timezone),
            PLANNER_TOOLS,
            router,
        )
        .with_timezone(tz)
    }

    /// Role instruction without the clock line
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Model messages for the current transcript, as of now
    pub fn render(&self, transcript: &Transcript) -> Vec<Message> {
        self.render_at(transcript, Utc::now())
    }

    /// Model messages for the current transcript, as of `now`
    pub fn render_at(&self, transcript: &Transcript, now: DateTime<Utc>) -> Vec<Message> {
        let local = now.with_timezone(&self.timezone);
        let system = format!(
            "{}\n\nThe current time is {} ({}, UTC{}).",
            self.instruction,
            local.format("%A %Y-%m-%d %H:%M"),
            self.timezone.name(),
            local.format("%:z"),
        );
        let mut messages = vec![Message::system(system)];

        for turn in transcript.turns() {
            let own = turn.source == self.role;
            match (&turn.body, own) {
                (TurnBody::Text { content }, true) => {
                    messages.push(Message::assistant(content.clone()));
                }
                (TurnBody::Text { content }, false) if turn.source == Role::Human => {
                    messages.push(Message::user(content.clone()));
                }
                (TurnBody::Text { content }, false) => {
                    messages.push(Message::user(format!("[{}] {}", turn.source, content)));
                }
                (TurnBody::ToolCall { tool, arguments, .. }, true) => {
                    messages.push(Message::assistant(
                        json!({ "function": tool, "arguments": arguments }).to_string(),
                    ));
                }
                (TurnBody::ToolResult { call_id, message, .. }, true) => {
                    messages.push(Message::tool_result(message.clone(), call_id.clone()));
                }
                // Other participants' tool traffic and error turns stay out of the prompt
                _ => {}
            }
        }

        messages
    }
}

#[async_trait]
impl Participant for ModelParticipant {
    fn role(&self) -> Role {
        self.role
    }

    fn tools(&self) -> &[&'static str] {
        self.tools
    }

    async fn respond(&self, transcript: &Transcript) -> Result<Reply, ParticipantError> {
        let messages = self.render(transcript);
        let (response, provider) = self.router.call(&messages).await?;
        tracing::debug!("{} answered via {}", self.role, provider);

        Ok(match response {
            LLMResponse::ToolCall(call) => {
                let arguments = call.arguments_json();
                Reply::tool_call(ToolRequest::new(call.name, arguments).with_id(call.id))
            }
            LLMResponse::FinalAnswer(answer) => Reply::text(answer.content),
        })
    }
}

fn planner_instruction(timezone: &str) -> String {
    format!(
        r#"You are an AI specialized in creating study plans.
The user lives in the {timezone} timezone; write every time as local
wall-clock time in that timezone, and resolve words like "tomorrow" against
the current time given at the end of this message.

1. Ask the user about their learning goals, subjects, and available time.
2. Then present a study schedule in natural language (do not show JSON).
3. When the user agrees, reply with ONLY this JSON object and nothing else:

{{"function": "{tool}", "arguments": {{"events": [
  {{"summary": "Learn Math", "start": "2025-07-25T08:00:00", "end": "2025-07-25T09:30:00",
    "timeZone": "{timezone}", "description": "Review integrals"}}
]}}}}

Every event must end after it starts. If the tool reports an error, fix the
schedule and call it again. After a successful save, say nothing further; the
calendar agent handles syncing."#,
        timezone = timezone,
        tool = PERSIST_SCHEDULE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::transcript::ToolStatus;

    fn planner() -> ModelParticipant {
        let config = Arc::new(crate::config::Config::default().llm);
        ModelParticipant::planner(Arc::new(LLMRouter::new(vec![], config)), "Asia/Ho_Chi_Minh")
    }

    #[test]
    fn test_instruction_mentions_tool_and_timezone() {
        let planner = planner();
        assert!(planner.instruction().contains(PERSIST_SCHEDULE));
        assert!(planner.instruction().contains("Asia/Ho_Chi_Minh"));
        assert_eq!(planner.tools(), &[PERSIST_SCHEDULE]);
        assert_eq!(planner.role(), Role::Planner);
    }

    #[test]
    fn test_clock_is_local_to_configured_timezone() {
        let now = "2026-10-16T17:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let messages = planner().render_at(&Transcript::new(), now);

        let system = &messages[0].content;
        assert!(system.starts_with(planner().instruction()));
        let expected = "The current time is Saturday 2026-10-17 00:30 (Asia/Ho_Chi_Minh, UTC+07:00).";
        assert!(system.ends_with(expected), "{}", system);
    }

    #[test]
    fn test_clock_is_taken_per_render() {
        let planner = planner();
        let transcript = Transcript::new();
        let morning = "2026-10-16T01:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let evening = "2026-10-16T18:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let first = planner.render_at(&transcript, morning);
        let second = planner.render_at(&transcript, evening);
        assert!(first[0].content.contains("Friday 2026-10-16 08:00"));
        assert!(second[0].content.contains("Saturday 2026-10-17 01:00"));

        let today = || {
            Utc::now()
                .with_timezone(&chrono_tz::Asia::Ho_Chi_Minh)
                .format("%Y-%m-%d")
                .to_string()
        };
        let before = today();
        let rendered = planner.render(&transcript);
        let after = today();
        assert!(rendered[0].content.contains(&before) || rendered[0].content.contains(&after));
    }

    #[test]
    fn test_unknown_timezone_clock_falls_back_to_utc() {
        let config = Arc::new(crate::config::Config::default().llm);
        let planner =
            ModelParticipant::planner(Arc::new(LLMRouter::new(vec![], config)), "Nowhere/Else");
        let now = "2026-10-16T17:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let system = &planner.render_at(&Transcript::new(), now)[0].content;
        assert!(system.ends_with("Friday 2026-10-16 17:30 (UTC, UTC+00:00)."), "{}", system);
    }

    #[test]
    fn test_render_from_planner_perspective() {
        let mut transcript = Transcript::new();
        transcript.push(Role::Human, TurnBody::text("Plan math tomorrow"));
        transcript.push(
            Role::Planner,
            TurnBody::ToolCall {
                call_id: "call_1".to_string(),
                tool: PERSIST_SCHEDULE.to_string(),
                arguments: json!({"events": []}),
            },
        );
        transcript.push(
            Role::Planner,
            TurnBody::ToolResult {
                call_id: "call_1".to_string(),
                tool: PERSIST_SCHEDULE.to_string(),
                status: ToolStatus::Failure,
                message: "❌ schedule contains no events".to_string(),
                data: None,
            },
        );
        transcript.push(Role::Synchronizer, TurnBody::text("✅ synced"));
        transcript.push(Role::Planner, TurnBody::error("timeout"));

        let messages = planner().render(&transcript);
        let roles: Vec<String> = messages.iter().map(|m| m.role.to_string()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "user"]);
        assert!(messages[2].content.contains("\"function\""));
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[4].content, "[synchronizer] ✅ synced");
    }

    #[tokio::test]
    async fn test_respond_without_providers_is_a_model_error() {
        let mut transcript = Transcript::new();
        transcript.push(Role::Human, TurnBody::text("hi"));
        let err = planner().respond(&transcript).await.unwrap_err();
        assert!(matches!(err, ParticipantError::Model(_)));
    }
}
