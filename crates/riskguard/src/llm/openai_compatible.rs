//! OpenAI-compatible chat-completions client (vLLM, Ollama, hosted gateways)

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{GenerationConfig, LLMConfig, LLMProvider, ProviderInfo};

pub struct OpenAICompatibleProvider {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            "Creating OpenAI-compatible provider"
        );

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML
    /// (e.g. a gateway error page) instead of valid JSON.
    fn parse_json_body<T: serde::de::DeserializeOwned>(
        body: &str,
        status: reqwest::StatusCode,
        endpoint: &str,
    ) -> Result<T> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}): {}",
                endpoint,
                status,
                preview
            ));
        }

        serde_json::from_str::<T>(body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }

    fn request_body(&self, prompt: &str, config: &GenerationConfig) -> serde_json::Value {
        let mut request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": false
        });
        if !config.stop_sequences.is_empty() {
            request["stop"] = json!(config.stop_sequences);
        }
        if let Some(seed) = config.seed {
            request["seed"] = json!(seed);
        }
        request
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = &self.endpoint;
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.model,
            max_tokens = config.max_tokens,
            temperature = config.temperature,
            prompt_len = prompt.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(prompt, config))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::error!(endpoint = %endpoint, "Request timed out");
                    anyhow!("Request to {} timed out", endpoint)
                } else if e.is_connect() {
                    tracing::error!(endpoint = %endpoint, error = %e, "Connection failed");
                    anyhow!("Failed to connect to {}: {}", endpoint, e)
                } else {
                    tracing::error!(endpoint = %endpoint, error = %e, "Request failed");
                    anyhow!("Request to {} failed: {}", endpoint, e)
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;
        if !status.is_success() {
            tracing::error!(endpoint = %endpoint, status = %status, "API returned error");
            return Err(anyhow!("API error ({}): {}", status, body));
        }

        let result: ChatCompletionResponse = Self::parse_json_body(&body, status, endpoint)?;
        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices returned from {}", endpoint))?;

        tracing::debug!(chars = content.chars().count(), "Chat completion received");
        Ok(content)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai-compatible".to_string(),
            model: self.model.clone(),
            is_local: self.endpoint.contains("localhost") || self.endpoint.contains("127.0.0.1"),
        }
    }
}

/// Response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAICompatibleProvider {
        OpenAICompatibleProvider::new(&LLMConfig::default()).unwrap()
    }

    #[test]
    fn html_body_is_reported_as_such() {
        let err = OpenAICompatibleProvider::parse_json_body::<ChatCompletionResponse>(
            "<html><body>502 Bad Gateway</body></html>",
            reqwest::StatusCode::OK,
            "http://gateway",
        )
        .unwrap_err();
        assert!(err.to_string().contains("HTML"));
    }

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"支付拦截解除流程"}}]}"#;
        let parsed: ChatCompletionResponse =
            OpenAICompatibleProvider::parse_json_body(body, reqwest::StatusCode::OK, "x").unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("支付拦截解除流程")
        );
    }

    #[test]
    fn request_body_carries_sampling_settings() {
        let p = provider();
        let mut config = GenerationConfig::from(&LLMConfig::default());
        config.temperature = 0.0;
        config.stop_sequences = vec!["\n".to_string()];
        let body = p.request_body("hi", &config);

        assert_eq!(body["model"], "Qwen2.5-7B");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["stop"][0], "\n");
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn localhost_endpoint_is_local() {
        assert!(provider().info().is_local);
    }
}
