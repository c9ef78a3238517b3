use std::sync::Arc;

use crate::embeddings::EmbeddingModel;
use crate::error::AgentError;
use crate::storage::VectorIndex;
use crate::types::{RankedResult, RetrieverKind};

/// Dense retrieval: embed the query, ask the vector index for neighbours.
pub struct SemanticRetriever {
    embedder: Arc<dyn EmbeddingModel>,
    index: Arc<dyn VectorIndex>,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RankedResult>, AgentError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed_query(query)
            .map_err(AgentError::Embedding)?;
        let mut hits = self
            .index
            .nearest(&vector, k)
            .await
            .map_err(AgentError::VectorIndex)?;
        hits.truncate(k);
        Ok(RankedResult::from_ordered(hits, RetrieverKind::Semantic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryVectorIndex;
    use crate::testing::{fixture_corpus, HashEmbedder};

    #[tokio::test]
    async fn returns_at_most_k_ranked_results() {
        let embedder = Arc::new(HashEmbedder::new());
        let index = InMemoryVectorIndex::from_documents(fixture_corpus(), embedder.as_ref()).unwrap();
        let retriever = SemanticRetriever::new(embedder, Arc::new(index));

        let results = retriever.retrieve("支付拦截解除流程", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].id, "sop-payment");
        assert!(results.iter().all(|r| r.retriever == RetrieverKind::Semantic));
    }

    #[tokio::test]
    async fn embedding_failure_is_classified() {
        let embedder = Arc::new(HashEmbedder::failing());
        let retriever = SemanticRetriever::new(embedder, Arc::new(InMemoryVectorIndex::new()));
        let err = retriever.retrieve("anything", 3).await.unwrap_err();
        assert!(matches!(err, AgentError::Embedding(_)));
    }
}
