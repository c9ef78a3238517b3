//! LLM Module - chat-completion access for rewriting, routing, answering and judging
//! Every model call in the crate goes through [`LLMManager`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod openai_compatible;

pub use openai_compatible::OpenAICompatibleProvider;

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Full chat-completions URL of an OpenAI-compatible server.
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on a single model call, enforced by the manager.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8002/v1/chat/completions".to_string(),
            model: "Qwen2.5-7B".to_string(),
            api_key: "EMPTY".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            top_p: 0.95,
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

/// Core trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Get provider info
    fn info(&self) -> ProviderInfo;
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
}

impl From<&LLMConfig> for GenerationConfig {
    fn from(config: &LLMConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            stop_sequences: vec![],
            seed: None,
        }
    }
}

/// Provider information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub is_local: bool,
}

/// Shared handle over one provider with the crate's sampling defaults and timeout.
pub struct LLMManager {
    config: LLMConfig,
    provider: Arc<dyn LLMProvider>,
}

impl LLMManager {
    pub fn new(config: LLMConfig, provider: Arc<dyn LLMProvider>) -> Self {
        Self { config, provider }
    }

    /// Build the manager over the configured OpenAI-compatible endpoint.
    pub fn from_config(config: LLMConfig) -> Result<Self> {
        let provider = OpenAICompatibleProvider::new(&config)?;
        Ok(Self::new(config, Arc::new(provider)))
    }

    pub fn info(&self) -> ProviderInfo {
        self.provider.info()
    }

    /// Generate with the configured temperature and token budget.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with(prompt, GenerationConfig::from(&self.config))
            .await
    }

    /// Generate with the configured temperature and a custom token budget.
    pub async fn generate_custom(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let mut config = GenerationConfig::from(&self.config);
        config.max_tokens = max_tokens;
        self.generate_with(prompt, config).await
    }

    /// Greedy decoding, used for classification and grading.
    pub async fn generate_deterministic(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let mut config = GenerationConfig::from(&self.config);
        config.max_tokens = max_tokens;
        config.temperature = 0.0;
        self.generate_with(prompt, config).await
    }

    pub async fn generate_with(&self, prompt: &str, config: GenerationConfig) -> Result<String> {
        let limit = Duration::from_secs(self.config.timeout_secs.max(1));
        match tokio::time::timeout(limit, self.provider.generate(prompt, &config)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = limit.as_secs(),
                    model = %self.config.model,
                    "LLM call timed out"
                );
                Err(anyhow!("LLM call timed out after {}s", limit.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLlm;

    #[tokio::test]
    async fn deterministic_calls_use_zero_temperature() {
        let llm = Arc::new(ScriptedLlm::new("ok"));
        let manager = LLMManager::new(LLMConfig::default(), llm.clone());

        manager.generate_deterministic("classify me", 8).await.unwrap();
        manager.generate("answer me").await.unwrap();

        let temps = llm.temperatures();
        assert_eq!(temps, vec![0.0, 0.1]);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let manager = LLMManager::new(LLMConfig::default(), Arc::new(ScriptedLlm::failing()));
        assert!(manager.generate("hello").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let config = LLMConfig {
            timeout_secs: 1,
            ..LLMConfig::default()
        };
        let llm = ScriptedLlm::new("late").with_delay(Duration::from_secs(5));
        let manager = LLMManager::new(config, Arc::new(llm));

        let err = manager.generate("hello").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
