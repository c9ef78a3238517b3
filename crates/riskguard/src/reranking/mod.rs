//! Second-stage precision ranking over fused candidates.

pub mod cross_encoder;

pub use cross_encoder::CrossEncoderReranker;

use anyhow::Result;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::RerankerConfig;
use crate::types::Document;

/// Joint (query, passage) relevance model.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, passage: &str) -> Result<f32>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RerankOutcome {
    /// Ordered by relevance score.
    Reranked(Vec<Document>),
    /// Scorer unavailable or failed; fused order kept.
    PassThrough(Vec<Document>),
}

impl RerankOutcome {
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            RerankOutcome::Reranked(docs) | RerankOutcome::PassThrough(docs) => docs,
        }
    }
}

/// Keeps the top `top_n` candidates by cross-encoder score. Without a usable
/// scorer it degrades to the first `top_n` candidates in fused order.
pub struct Reranker {
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self {
            scorer: Some(scorer),
        }
    }

    pub fn unavailable() -> Self {
        Self { scorer: None }
    }

    /// Load the cross-encoder from disk; a missing or broken model degrades instead of failing.
    pub fn load(config: &RerankerConfig) -> Self {
        if !config.enabled {
            tracing::info!("Reranker disabled by configuration");
            return Self::unavailable();
        }
        match CrossEncoderReranker::new(&config.model_dir) {
            Ok(model) => Self::new(Arc::new(model)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    model_dir = %config.model_dir.display(),
                    "Cross-encoder unavailable, results will keep fused order"
                );
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn rerank(&self, query: &str, mut candidates: Vec<Document>, top_n: usize) -> RerankOutcome {
        let Some(scorer) = &self.scorer else {
            candidates.truncate(top_n);
            return RerankOutcome::PassThrough(candidates);
        };

        let mut scored: Vec<(usize, f32)> = Vec::with_capacity(candidates.len());
        for (i, doc) in candidates.iter().enumerate() {
            match scorer.score(query, &doc.content) {
                Ok(score) => scored.push((i, score)),
                Err(e) => {
                    tracing::warn!(error = %e, "Cross-encoder scoring failed, keeping fused order");
                    candidates.truncate(top_n);
                    return RerankOutcome::PassThrough(candidates);
                }
            }
        }

        // stable: equal scores keep fused order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut slots: Vec<Option<Document>> = candidates.into_iter().map(Some).collect();
        let reranked = scored
            .into_iter()
            .take(top_n)
            .filter_map(|(i, _)| slots[i].take())
            .collect();
        RerankOutcome::Reranked(reranked)
    }
}
