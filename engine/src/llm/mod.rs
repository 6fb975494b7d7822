//! Model backend abstraction
//!
//! Participants that need a language model talk to it through [`LLMProvider`].
//! Two concrete backends exist: [`ollama::OllamaProvider`] for local models and
//! [`openai::OpenAICompatProvider`] for OpenAI and any endpoint that speaks the
//! same chat-completions dialect (Gemini's compatibility endpoint included).
//! [`router::LLMRouter`] orders them and fails over between them.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("All providers exhausted")]
    Exhausted,
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Exhausted => EngineError::AllProvidersExhausted,
            LLMError::NetworkError(msg) => EngineError::Network(msg),
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a model conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,

    pub content: String,

    /// Set on tool result messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Role of a message sender, as the model sees it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Response from a model provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LLMResponse {
    /// The model wants to call a tool
    ToolCall(ToolCall),

    /// The model answered in plain text
    FinalAnswer(FinalAnswer),
}

impl LLMResponse {
    /// Classify raw model output as a tool call or plain text
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        match parse_tool_calls(&content) {
            Some(call) => LLMResponse::ToolCall(call),
            None => LLMResponse::FinalAnswer(FinalAnswer::new(content)),
        }
    }
}

/// Tool call request from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,

    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Arguments parsed as JSON; a malformed string becomes a JSON string value
    pub fn arguments_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(self.arguments.clone()))
    }
}

/// Plain-text answer from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub content: String,
}

impl FinalAnswer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Contract every model backend implements
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name as used in `llm.default_provider` (e.g. "ollama", "gemini")
    fn name(&self) -> &str;

    /// True for providers running on this machine
    fn is_local(&self) -> bool;

    /// Estimated cost in USD for `tokens` tokens; local providers return 0.0
    fn estimated_cost(&self, tokens: usize) -> f64;

    /// Generate a response for the given history.
    ///
    /// The history includes the system instruction, prior turns and tool results.
    async fn generate(&self, messages: &[Message]) -> Result<LLMResponse>;

    /// Whether the provider looks usable (credentials present, server reachable)
    async fn check_health(&self) -> bool {
        true
    }
}

/// Extract a tool call from model text.
///
/// Models without native function calling are told to answer with a JSON
/// object. The following shapes are recognised:
/// 1. Raw JSON: `{"function": "...", "arguments": {...}}` (`"name"` works too)
/// 2. The same object inside a markdown fence, even with prose after it
/// 3. `<tool_call>name({...})</tool_call>` markers
/// 4. A `{"function": ...}` object embedded in prose
pub fn parse_tool_calls(content: &str) -> Option<ToolCall> {
    let trimmed = content.trim();

    if let Some(tc) = try_parse_function_json(trimmed) {
        return Some(tc);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(tc) = try_parse_function_json(inner.trim()) {
            return Some(tc);
        }
    }

    if let Some(tc) = parse_marker_call(trimmed) {
        return Some(tc);
    }

    for marker in ["{\"function\"", "{\"name\""] {
        if let Some(pos) = trimmed.find(marker) {
            if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
                if let Some(tc) = try_parse_function_json(json_str) {
                    return Some(tc);
                }
            }
        }
    }

    None
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4())
}

fn try_parse_function_json(s: &str) -> Option<ToolCall> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    let function = json
        .get("function")
        .or_else(|| json.get("name"))?
        .as_str()?;
    let arguments = json.get("arguments")?;

    // Some models double-encode the arguments object as a string
    let arguments = match arguments {
        serde_json::Value::String(inner) => inner.clone(),
        other => other.to_string(),
    };

    Some(ToolCall::new(new_call_id(), function, arguments))
}

fn parse_marker_call(content: &str) -> Option<ToolCall> {
    let start = content.find("<tool_call>")? + "<tool_call>".len();
    let end = content[start..].find("</tool_call>")? + start;
    let body = content[start..end].trim();

    let paren = body.find('(')?;
    let name = body[..paren].trim();
    if name.is_empty() {
        return None;
    }
    let args_end = body.rfind(')').unwrap_or(body.len());
    let arguments = if args_end > paren {
        &body[paren + 1..args_end]
    } else {
        ""
    };

    Some(ToolCall::new(new_call_id(), name, arguments.trim()))
}

/// Body of the first markdown code fence, skipping the language tag line.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let body_end = body_start + content[body_start..].find("```")?;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Balanced JSON object at the start of `s`, honouring string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
