//! Provider ranking and failover
//!
//! The configured default provider is tried first, then the remaining
//! providers from cheapest to most expensive. Each attempt is bounded by the
//! cloud or local timeout from `[llm]`; the first success wins.

use super::{LLMError, LLMProvider, LLMResponse, Message};
use crate::config::{LLMConfig, ProviderEndpoint};
use crate::secrets::SecretStore;
use std::sync::Arc;
use std::time::Duration;

use super::ollama::OllamaProvider;
use super::openai::OpenAICompatProvider;

pub struct LLMRouter {
    providers: Vec<Box<dyn LLMProvider>>,
    config: Arc<LLMConfig>,
}

impl LLMRouter {
    pub fn new(providers: Vec<Box<dyn LLMProvider>>, config: Arc<LLMConfig>) -> Self {
        Self { providers, config }
    }

    /// Router over every configured backend: Gemini, OpenAI and Ollama.
    ///
    /// Cloud providers whose key cannot be resolved are still registered; they
    /// fail fast with an authentication error and the router moves on.
    pub fn from_config(config: Arc<LLMConfig>, secrets: SecretStore) -> Self {
        let providers: Vec<Box<dyn LLMProvider>> = vec![
            Box::new(OpenAICompatProvider::gemini(
                config.gemini.clone(),
                secrets.clone(),
            )),
            Box::new(OpenAICompatProvider::openai(
                config.openai.clone(),
                secrets,
            )),
            Box::new(OllamaProvider::from_endpoint(&config.ollama)),
        ];
        Self::new(providers, config)
    }

    /// Configured endpoint for a named provider, if any
    pub fn endpoint(&self, name: &str) -> Option<&ProviderEndpoint> {
        match name {
            "gemini" => Some(&self.config.gemini),
            "openai" => Some(&self.config.openai),
            "ollama" => Some(&self.config.ollama),
            _ => None,
        }
    }

    /// Rough token estimate at ~4 characters per token
    fn estimate_tokens(messages: &[Message]) -> usize {
        messages.iter().map(|m| m.content.len()).sum::<usize>() / 4
    }

    /// Providers in attempt order: default first, then by ascending cost
    pub fn rank_providers(&self, estimated_tokens: usize) -> Vec<&dyn LLMProvider> {
        let mut providers: Vec<&dyn LLMProvider> =
            self.providers.iter().map(|b| b.as_ref()).collect();

        let default_provider = self.config.default_provider.as_str();

        // Stable sort keeps registration order among equals
        providers.sort_by(|a, b| {
            let a_default = a.name() == default_provider;
            let b_default = b.name() == default_provider;
            b_default.cmp(&a_default).then_with(|| {
                a.estimated_cost(estimated_tokens)
                    .partial_cmp(&b.estimated_cost(estimated_tokens))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        providers
    }

    fn timeout_for(&self, provider: &dyn LLMProvider) -> Duration {
        if provider.is_local() {
            Duration::from_secs(self.config.local_timeout_secs)
        } else {
            Duration::from_secs(self.config.cloud_timeout_secs)
        }
    }

    /// Generate with automatic failover.
    ///
    /// Returns the response and the name of the provider that produced it.
    pub async fn call(&self, messages: &[Message]) -> super::Result<(LLMResponse, String)> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No LLM providers configured".to_string(),
            ));
        }

        let ranked = self.rank_providers(Self::estimate_tokens(messages));

        for provider in ranked {
            let timeout = self.timeout_for(provider);
            tracing::debug!(
                "Attempting provider: {} (timeout: {}s)",
                provider.name(),
                timeout.as_secs()
            );

            match tokio::time::timeout(timeout, provider.generate(messages)).await {
                Ok(Ok(response)) => {
                    tracing::info!("Provider {} succeeded", provider.name());
                    return Ok((response, provider.name().to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Provider {} timed out after {}s",
                        provider.name(),
                        timeout.as_secs()
                    );
                }
            }
        }

        tracing::error!("All LLM providers exhausted");
        Err(LLMError::Exhausted)
    }

    /// (provider_name, is_healthy) for every registered provider
    pub async fn check_health(&self) -> Vec<(&str, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name(), is_healthy));
        }
        results
    }
}
