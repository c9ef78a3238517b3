use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::LLMConfig;

/// Environment variable that overrides `llm.api_key`.
pub const API_KEY_ENV: &str = "RISKGUARD_LLM_API_KEY";
/// Environment variable that overrides `llm.endpoint`.
pub const ENDPOINT_ENV: &str = "RISKGUARD_LLM_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    /// LanceDB directory holding the chunk table.
    pub index_dir: PathBuf,
    /// Markdown SOP documents ingested into the index.
    pub sop_dir: PathBuf,
    pub user_db_path: PathBuf,
    pub faq_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LLMConfig,
    pub agent: RoutingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub model_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub lexical_k: usize,
    pub semantic_k: usize,
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    pub rrf_k: usize,
    /// Fused candidates handed to the reranker.
    pub max_candidates: usize,
    pub top_n: usize,
    pub enable_query_rewrite: bool,
    pub enable_lexical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Directory role that unlocks the internal test flow.
    pub internal_role: String,
    /// Fixed query used to look up the whitelist SOP.
    pub sop_query: String,
    /// Characters of the SOP excerpt quoted back to the user.
    pub sop_excerpt_chars: usize,
}

impl AgentConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        let r = &self.retrieval;
        if r.lexical_k == 0 || r.semantic_k == 0 {
            return Err("retrieval.lexical_k and retrieval.semantic_k must be > 0".into());
        }
        if r.top_n == 0 {
            return Err("retrieval.top_n must be > 0".into());
        }
        if r.max_candidates < r.top_n {
            return Err("retrieval.max_candidates must be >= top_n".into());
        }
        if r.lexical_weight < 0.0 || r.semantic_weight < 0.0 {
            return Err("retrieval weights must be non-negative".into());
        }
        if r.lexical_weight + r.semantic_weight <= 0.0 {
            return Err("retrieval weights must not both be zero".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err("llm.temperature must be in [0.0, 2.0]".into());
        }
        if self.llm.endpoint.trim().is_empty() {
            return Err("llm.endpoint must not be empty".into());
        }
        if self.agent.internal_role.trim().is_empty() {
            return Err("agent.internal_role must not be empty".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Secrets and deployment endpoints may come from the environment instead of the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.llm.api_key = key;
            }
        }
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.is_empty() {
                self.llm.endpoint = endpoint;
            }
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            index_dir: data_dir.join("lance_db"),
            sop_dir: data_dir.join("sops"),
            user_db_path: data_dir.join("db").join("mock_database.json"),
            faq_path: data_dir.join("faqs").join("risk_faq.json"),
            data_dir,
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LLMConfig::default(),
            agent: RoutingConfig::default(),
        }
    }
}

/// Model files live under `./models`, `$MODEL_PATH`, or the user's local data dir.
fn default_model_dir() -> PathBuf {
    if Path::new("models").exists() {
        PathBuf::from("models")
    } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
        PathBuf::from(env_path)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("riskguard")
            .join("models")
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir().join("bge-m3"),
            dimension: 1024,
            max_length: 512,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: default_model_dir().join("bge-reranker-base"),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_k: 10,
            semantic_k: 10,
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            rrf_k: 60,
            max_candidates: 20,
            top_n: 3,
            enable_query_rewrite: true,
            enable_lexical: true,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            internal_role: "internal_qa".to_string(),
            sop_query: "内部测试账号加白流程".to_string(),
            sop_excerpt_chars: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.top_n, 3);
        assert_eq!(config.retrieval.rrf_k, 60);
        assert_eq!(config.agent.internal_role, "internal_qa");
    }

    #[test]
    fn rejects_zero_top_n() {
        let mut config = AgentConfig::default();
        config.retrieval.top_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_weights() {
        let mut config = AgentConfig::default();
        config.retrieval.lexical_weight = 0.0;
        config.retrieval.semantic_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut config = AgentConfig::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"retrieval": {"top_n": 5}, "llm": {"model": "qwen"}}"#)
                .unwrap();
        assert_eq!(config.retrieval.top_n, 5);
        assert_eq!(config.retrieval.lexical_k, 10);
        assert_eq!(config.llm.model, "qwen");
        assert!(config.validate().is_ok());
    }
}
