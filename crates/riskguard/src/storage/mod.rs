//! Chunk persistence and nearest-neighbour lookup.

pub mod document_store;
pub mod lance_store;
pub mod memory;

pub use document_store::DocumentStore;
pub use lance_store::{LanceStore, SearchHit};
pub use memory::InMemoryVectorIndex;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ChunkRecord, Document};

/// Read side of the vector store used at query time.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` chunk ids ordered by descending similarity to `query`.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>>;

    /// Every stored chunk, in ingestion order.
    async fn snapshot(&self) -> Result<Vec<Document>>;
}

/// Write side used by ingestion.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()>;

    /// Remove rows of `source` whose `doc_id` differs from `keep_doc_id`.
    /// Returns the number of rows removed.
    async fn delete_stale(&self, source: &str, keep_doc_id: &str) -> Result<usize>;

    /// Ordinal the next ingested chunk should take.
    async fn next_ordinal(&self) -> Result<u64>;

    async fn clear(&self) -> Result<()>;
}
