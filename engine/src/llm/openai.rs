//! OpenAI-compatible chat-completions provider
//!
//! Serves both OpenAI itself and Gemini, which exposes the same
//! `/chat/completions` dialect at its `.../v1beta/openai` endpoint.

use super::{LLMError, LLMProvider, LLMResponse, Message};
use crate::config::ProviderEndpoint;
use crate::secrets::SecretStore;
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAICompatProvider {
    name: String,
    endpoint: ProviderEndpoint,
    /// Secret name holding the API key
    key_name: String,
    /// USD per 1K tokens
    cost_per_1k: f64,
    secrets: SecretStore,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: ProviderEndpoint,
        key_name: impl Into<String>,
        cost_per_1k: f64,
        secrets: SecretStore,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            key_name: key_name.into(),
            cost_per_1k,
            secrets,
            client: reqwest::Client::new(),
        }
    }

    /// OpenAI with the `openai_api_key` secret
    pub fn openai(endpoint: ProviderEndpoint, secrets: SecretStore) -> Self {
        Self::new(
            "openai",
            endpoint,
            crate::secrets::OPENAI_API_KEY,
            0.002,
            secrets,
        )
    }

    /// Gemini through its OpenAI-compatible endpoint with the `gemini_api_key` secret
    pub fn gemini(endpoint: ProviderEndpoint, secrets: SecretStore) -> Self {
        Self::new(
            "gemini",
            endpoint,
            crate::secrets::GEMINI_API_KEY,
            0.0003,
            secrets,
        )
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        false
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k
    }

    async fn check_health(&self) -> bool {
        self.secrets.has_secret(&self.key_name)
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<LLMResponse> {
        let api_key = self
            .secrets
            .require(&self.key_name)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let url = format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        );

        // Tool results go back as user text: no native function-calling schema is declared
        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    super::MessageRole::Tool => "user".to_string(),
                    other => other.to_string(),
                };
                json!({ "role": role, "content": msg.content })
            })
            .collect();

        let payload = json!({
            "model": self.endpoint.model,
            "messages": api_messages,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                s if s >= 500 => LLMError::ProviderUnavailable(format!(
                    "{} API error ({}): {}",
                    self.name, status, text
                )),
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))?;

        Ok(LLMResponse::from_content(content))
    }
}
