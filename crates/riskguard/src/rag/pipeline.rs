//! Hybrid retrieval pipeline
//!
//! rewrite -> (lexical ‖ semantic) -> weighted rank fusion -> cross-encoder rerank.
//! Every call recomputes from scratch; nothing is cached between queries.

use serde::Serialize;
use std::sync::Arc;

use super::query_rewriter::QueryRewriter;
use crate::config::RetrievalConfig;
use crate::error::AgentError;
use crate::reranking::{RerankOutcome, Reranker};
use crate::search::{weighted_rank_fusion, FusedResult, LexicalRetriever, SemanticRetriever};
use crate::storage::DocumentStore;
use crate::types::{Document, RankedResult};

/// Which stage produced the final ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Reranked,
    Fused,
    SemanticOnly,
}

#[derive(Debug, Clone)]
pub struct SearchTrace {
    pub query: String,
    pub rewritten_query: String,
    pub stage: RetrievalStage,
    pub documents: Vec<Document>,
}

pub struct RetrievalPipeline {
    store: Arc<DocumentStore>,
    lexical: Option<LexicalRetriever>,
    semantic: SemanticRetriever,
    rewriter: QueryRewriter,
    reranker: Reranker,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    /// Builds the lexical index from the store snapshot. If that fails the
    /// pipeline runs semantic-only for its whole lifetime.
    pub fn new(
        store: Arc<DocumentStore>,
        semantic: SemanticRetriever,
        rewriter: QueryRewriter,
        reranker: Reranker,
        config: RetrievalConfig,
    ) -> Self {
        let lexical = if config.enable_lexical {
            match LexicalRetriever::build(store.documents()) {
                Ok(index) => {
                    tracing::info!(documents = index.len(), "Lexical index ready");
                    Some(index)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Lexical index unavailable, retrieval degrades to semantic-only");
                    None
                }
            }
        } else {
            tracing::info!("Lexical retrieval disabled by configuration");
            None
        };

        Self {
            store,
            lexical,
            semantic,
            rewriter,
            reranker,
            config,
        }
    }

    pub fn has_lexical(&self) -> bool {
        self.lexical.is_some()
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Top `top_n` documents for `query`, best first.
    pub async fn search(&self, query: &str) -> Result<Vec<Document>, AgentError> {
        Ok(self.search_traced(query).await?.documents)
    }

    pub async fn search_traced(&self, query: &str) -> Result<SearchTrace, AgentError> {
        let rewritten = self.rewriter.rewrite(query).await;

        let (lexical, semantic) = tokio::join!(
            async { self.lexical_candidates(&rewritten) },
            self.semantic.retrieve(&rewritten, self.config.semantic_k),
        );
        let semantic = semantic?;

        let lexical_used = lexical.is_some();
        let mut lists = Vec::with_capacity(2);
        if let Some(lexical) = lexical {
            lists.push((lexical, self.config.lexical_weight));
        }
        lists.push((semantic, self.config.semantic_weight));

        let mut fused = weighted_rank_fusion(&lists, self.config.rrf_k);
        fused.truncate(self.config.max_candidates);
        let candidates = self.resolve(&fused);

        let (stage, documents) = match self.reranker.rerank(&rewritten, candidates, self.config.top_n) {
            RerankOutcome::Reranked(docs) => (RetrievalStage::Reranked, docs),
            RerankOutcome::PassThrough(docs) if lexical_used => (RetrievalStage::Fused, docs),
            RerankOutcome::PassThrough(docs) => (RetrievalStage::SemanticOnly, docs),
        };

        tracing::info!(
            query = %query,
            rewritten = %rewritten,
            fused = fused.len(),
            returned = documents.len(),
            stage = ?stage,
            "Retrieval complete"
        );

        Ok(SearchTrace {
            query: query.to_string(),
            rewritten_query: rewritten,
            stage,
            documents,
        })
    }

    /// Plain semantic nearest-neighbour lookup, no rewrite, fusion or rerank.
    pub async fn semantic_lookup(&self, query: &str, k: usize) -> Result<Vec<Document>, AgentError> {
        let ranked = self.semantic.retrieve(query, k).await?;
        Ok(ranked
            .iter()
            .filter_map(|r| self.store.get(&r.id).cloned())
            .collect())
    }

    fn lexical_candidates(&self, query: &str) -> Option<Vec<RankedResult>> {
        let lexical = self.lexical.as_ref()?;
        match lexical.retrieve(query, self.config.lexical_k) {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!(error = %e, "Lexical retrieval failed, using semantic results only");
                None
            }
        }
    }

    fn resolve(&self, fused: &[FusedResult]) -> Vec<Document> {
        fused
            .iter()
            .filter_map(|f| match self.store.get(&f.id) {
                Some(doc) => Some(doc.clone()),
                None => {
                    tracing::warn!(id = %f.id, "Fused id missing from corpus snapshot");
                    None
                }
            })
            .collect()
    }
}
