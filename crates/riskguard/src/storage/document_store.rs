use anyhow::Result;
use std::collections::HashMap;

use super::VectorIndex;
use crate::types::Document;

/// Id-addressable snapshot of the corpus, taken once when the pipeline starts.
/// Position in the store is the document's ingestion ordinal.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    positions: HashMap<String, usize>,
}

impl DocumentStore {
    /// Later duplicates of an id are dropped so ids stay corpus-unique.
    pub fn new(documents: Vec<Document>) -> Self {
        let mut kept = Vec::with_capacity(documents.len());
        let mut positions = HashMap::with_capacity(documents.len());
        for doc in documents {
            if positions.contains_key(&doc.id) {
                tracing::warn!(id = %doc.id, "Duplicate document id in snapshot, keeping the first");
                continue;
            }
            positions.insert(doc.id.clone(), kept.len());
            kept.push(doc);
        }
        Self {
            documents: kept,
            positions,
        }
    }

    pub async fn load(index: &dyn VectorIndex) -> Result<Self> {
        let documents = index.snapshot().await?;
        tracing::info!(documents = documents.len(), "Loaded corpus snapshot");
        Ok(Self::new(documents))
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.positions.get(id).map(|&i| &self.documents[i])
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_keep_first() {
        let store = DocumentStore::new(vec![
            Document::new("a", "first", "x.md"),
            Document::new("b", "other", "x.md"),
            Document::new("a", "second", "y.md"),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().content, "first");
        assert!(store.get("missing").is_none());
    }
}
