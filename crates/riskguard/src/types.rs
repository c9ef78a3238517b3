use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key naming the file a chunk came from.
pub const SOURCE_KEY: &str = "source";

/// A retrievable passage. `id` is unique within the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            id: id.into(),
            content: content.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
    Lexical,
    Semantic,
}

/// One retriever's opinion of a document: its 1-based position and raw score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub id: String,
    pub score: f32,
    pub rank: usize,
    pub retriever: RetrieverKind,
}

impl RankedResult {
    /// Assign ranks to hits that are already ordered best first.
    pub fn from_ordered(hits: Vec<(String, f32)>, retriever: RetrieverKind) -> Vec<Self> {
        hits.into_iter()
            .enumerate()
            .map(|(i, (id, score))| Self {
                id,
                score,
                rank: i + 1,
                retriever,
            })
            .collect()
    }
}

/// Persisted shape of one chunk in the vector table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    /// Position in ingestion order across the whole corpus.
    pub ordinal: u64,
    pub text: String,
    pub source: String,
    pub heading: String,
    pub vector: Vec<f32>,
    pub metadata_json: String,
    pub created_at: i64,
}

impl ChunkRecord {
    pub fn metadata(&self) -> HashMap<String, String> {
        serde_json::from_str(&self.metadata_json).unwrap_or_default()
    }

    pub fn to_document(&self) -> Document {
        let mut metadata = self.metadata();
        metadata
            .entry(SOURCE_KEY.to_string())
            .or_insert_with(|| self.source.clone());
        Document {
            id: self.id.clone(),
            content: self.text.clone(),
            metadata,
        }
    }
}
