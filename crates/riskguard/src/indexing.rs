//! SOP ingestion: markdown files -> header chunks -> embeddings -> LanceDB.
//!
//! Re-ingesting a file replaces its previous chunks. The new rows are written
//! before the old ones are dropped, so a failed re-ingest leaves the earlier
//! version in place. Ordinals keep increasing across runs so the lexical
//! tie-break order matches ingestion order.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::embeddings::EmbeddingModel;
use crate::processing::{ChunkResult, MarkdownHeaderSplitter};
use crate::storage::ChunkSink;
use crate::types::ChunkRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub files_processed: usize,
    pub total_chunks: usize,
    pub failed_files: Vec<String>,
    pub duration_ms: u64,
}

/// Markdown files directly inside `dir`, sorted by name. Subdirectories are
/// not scanned: the file name is the chunk source key.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("SOP directory not found: {}", dir.display()));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("md"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Turn split chunks and their vectors into table rows numbered from `first_ordinal`.
pub fn build_records(
    source: &str,
    doc_id: &str,
    chunks: &[ChunkResult],
    vectors: Vec<Vec<f32>>,
    first_ordinal: u64,
) -> Result<Vec<ChunkRecord>> {
    if chunks.len() != vectors.len() {
        return Err(anyhow!(
            "Got {} vectors for {} chunks of {}",
            vectors.len(),
            chunks.len(),
            source
        ));
    }

    let created_at = chrono::Utc::now().timestamp();

    chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (chunk, vector))| {
            let mut metadata = chunk.headers.clone();
            metadata.insert(crate::types::SOURCE_KEY.to_string(), source.to_string());
            Ok(ChunkRecord {
                id: chunk.id.to_string(),
                doc_id: doc_id.to_string(),
                chunk_index: chunk.index as u32,
                ordinal: first_ordinal + i as u64,
                text: chunk.text.clone(),
                source: source.to_string(),
                heading: chunk.heading().unwrap_or_default().to_string(),
                vector,
                metadata_json: serde_json::to_string(&metadata)?,
                created_at,
            })
        })
        .collect()
}

pub struct Indexer {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn ChunkSink>,
    splitter: MarkdownHeaderSplitter,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, store: Arc<dyn ChunkSink>) -> Self {
        Self {
            embedder,
            store,
            splitter: MarkdownHeaderSplitter::default(),
        }
    }

    /// Drop every stored chunk, then ingest `dir`.
    pub async fn rebuild(&self, dir: &Path) -> Result<IngestReport> {
        self.store.clear().await.context("Failed to clear vector table")?;
        tracing::info!("Vector table cleared");
        self.ingest_dir(dir).await
    }

    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let files = markdown_files(dir)?;
        tracing::info!(dir = %dir.display(), files = files.len(), "Starting ingestion");

        let mut report = IngestReport::default();
        for path in &files {
            match self.ingest_file(path).await {
                Ok(chunks) => {
                    report.files_processed += 1;
                    report.total_chunks += chunks;
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to ingest file");
                    report.failed_files.push(path.display().to_string());
                }
            }
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            files = report.files_processed,
            chunks = report.total_chunks,
            failed = report.failed_files.len(),
            duration_ms = report.duration_ms,
            "Ingestion complete"
        );
        Ok(report)
    }

    /// Ingest one file, replacing earlier chunks from the same source.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let chunks = self.splitter.split(&content);
        let doc_id = Uuid::new_v4().to_string();

        let records = if chunks.is_empty() {
            tracing::debug!(source = %source, "No content after splitting");
            Vec::new()
        } else {
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            let vectors = self
                .embedder
                .embed_documents(&texts)
                .with_context(|| format!("Failed to embed {}", source))?;
            let first_ordinal = self.store.next_ordinal().await?;
            build_records(&source, &doc_id, &chunks, vectors, first_ordinal)?
        };

        let count = records.len();
        self.store.upsert_chunks(records).await?;
        let removed = self.store.delete_stale(&source, &doc_id).await?;
        if removed > 0 {
            tracing::debug!(source = %source, removed, "Replaced previous chunks");
        }

        if count > 0 {
            tracing::info!(source = %source, chunks = count, "Indexed file");
        }
        Ok(count)
    }
}
