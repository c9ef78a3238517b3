//! riskguard: a risk-control customer-support agent.
//!
//! Hybrid retrieval (Tantivy n-gram ‖ LanceDB dense vectors, weighted rank
//! fusion, cross-encoder rerank) behind a small intent-routing state machine.

pub mod agent;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod indexing;
pub mod llm;
pub mod processing;
pub mod rag;
pub mod reranking;
pub mod search;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use agent::{AgentGraph, AgentState, Intent, Node, TurnTrace};
pub use config::AgentConfig;
pub use engine::Engine;
pub use error::AgentError;
pub use indexing::{IngestReport, Indexer};
pub use llm::{GenerationConfig, LLMConfig, LLMManager, LLMProvider, ProviderInfo};
pub use rag::{EvalCase, EvalReport, Evaluator, RetrievalPipeline, RetrievalStage, SearchTrace};
pub use types::{Document, RankedResult, RetrieverKind};

// Re-export common types
pub use anyhow::{Error, Result};
