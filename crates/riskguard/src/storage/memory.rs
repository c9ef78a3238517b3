use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;

use super::VectorIndex;
use crate::embeddings::{cosine_similarity, EmbeddingModel};
use crate::types::Document;

/// Brute-force cosine index held in memory. Suits small corpora and tests.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed and insert every document in order.
    pub fn from_documents(documents: Vec<Document>, embedder: &dyn EmbeddingModel) -> Result<Self> {
        let index = Self::new();
        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let vectors = embedder.embed_documents(&texts)?;
        if vectors.len() != documents.len() {
            return Err(anyhow!(
                "Embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            ));
        }
        for (doc, vector) in documents.into_iter().zip(vectors) {
            index.insert(doc, vector);
        }
        Ok(index)
    }

    pub fn insert(&self, document: Document, vector: Vec<f32>) {
        self.entries.write().push((document, vector));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let entries = self.entries.read();
        let mut scored: Vec<(String, f32)> = entries
            .iter()
            .map(|(doc, vector)| (doc.id.clone(), cosine_similarity(query, vector)))
            .collect();
        // stable: equal similarities keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn snapshot(&self) -> Result<Vec<Document>> {
        Ok(self.entries.read().iter().map(|(doc, _)| doc.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Document {
        Document::new(id, format!("content {}", id), "test.md")
    }

    #[tokio::test]
    async fn nearest_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index.insert(doc("far"), vec![0.0, 1.0]);
        index.insert(doc("near"), vec![1.0, 0.1]);
        index.insert(doc("exact"), vec![1.0, 0.0]);

        let hits = index.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "exact");
        assert_eq!(hits[1].0, "near");
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let index = InMemoryVectorIndex::new();
        index.insert(doc("first"), vec![1.0, 0.0]);
        index.insert(doc("second"), vec![2.0, 0.0]);

        let hits = index.nearest(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].0, "first");
        assert_eq!(hits[1].0, "second");
    }

    #[tokio::test]
    async fn snapshot_preserves_order() {
        let index = InMemoryVectorIndex::new();
        index.insert(doc("a"), vec![1.0]);
        index.insert(doc("b"), vec![1.0]);
        let ids: Vec<String> = index.snapshot().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
