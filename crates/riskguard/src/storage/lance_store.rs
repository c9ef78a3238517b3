use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::Path;
use std::sync::Arc;

use super::{ChunkSink, VectorIndex};
use crate::types::{ChunkRecord, Document};

const SEED_ID: &str = "__seed__";

pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
    table_name: String,
}

impl LanceStore {
    pub async fn new(path: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let uri = path.to_string_lossy();
        let db = lancedb::connect(&uri)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            table_name: "sop_chunks".to_string(),
        };

        store.ensure_table().await?;
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(&self) -> Arc<Schema> {
        chunk_schema(self.dimension)
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&self.table_name) {
            // Create with a single seed record, then delete it
            let seed = ChunkRecord {
                id: SEED_ID.to_string(),
                doc_id: SEED_ID.to_string(),
                chunk_index: 0,
                ordinal: 0,
                text: String::new(),
                source: String::new(),
                heading: String::new(),
                vector: vec![0.0; self.dimension],
                metadata_json: "{}".to_string(),
                created_at: 0,
            };
            let schema = self.schema();
            let batch = records_to_batch(&schema, self.dimension, &[seed])
                .context("Failed to create seed RecordBatch")?;

            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(&self.table_name, Box::new(batches))
                .execute()
                .await
                .context("Failed to create chunk table")?;

            let table = self.db.open_table(&self.table_name).execute().await?;
            table.delete(&format!("id = '{}'", SEED_ID)).await.ok();
        }
        Ok(())
    }

    pub async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != self.dimension) {
            anyhow::bail!(
                "Chunk {} has a {}-d vector, table expects {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            );
        }

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .context("Failed to open chunk table")?;

        let schema = self.schema();
        let batch = records_to_batch(&schema, self.dimension, &chunks)
            .context("Failed to create RecordBatch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .context("Failed to insert chunks")?;

        tracing::debug!("Inserted {} chunks into LanceDB", chunks.len());
        Ok(())
    }

    pub async fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let table = self.db.open_table(&self.table_name).execute().await?;

        let results = table
            .query()
            .nearest_to(query)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_hits_from_batches(&batches, 0.0))
    }

    /// Delete rows of `source` left over from an earlier ingestion of it.
    pub async fn delete_stale(&self, source: &str, keep_doc_id: &str) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count_before = table.count_rows(None).await?;
        let predicate = format!(
            "source = '{}' AND doc_id != '{}'",
            escape_literal(source),
            escape_literal(keep_doc_id)
        );
        table.delete(&predicate).await?;
        let count_after = table.count_rows(None).await?;
        Ok(rows_removed(count_before, count_after))
    }

    pub async fn clear(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&self.table_name) {
            self.db.drop_table(&self.table_name, &[]).await?;
        }
        self.ensure_table().await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }

    /// Ordinal the next ingested chunk should take.
    pub async fn next_ordinal(&self) -> Result<u64> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .select(lancedb::query::Select::columns(&["ordinal"]))
            .execute()
            .await
            .context("Failed to query ordinals")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let max = batches
            .iter()
            .filter_map(|b| {
                b.column_by_name("ordinal")
                    .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
                    .map(|col| (0..col.len()).map(|i| col.value(i)).max())
            })
            .flatten()
            .max();
        Ok(max.map(|m| m + 1).unwrap_or(0))
    }

    /// Every stored chunk in ingestion order.
    pub async fn list_chunks(&self) -> Result<Vec<SearchHit>> {
        let count = self.count().await?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .limit(count)
            .execute()
            .await
            .context("LanceDB list query failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut hits = extract_hits_from_batches(&batches, 0.0);
        hits.retain(|h| h.id != SEED_ID);
        hits.sort_by_key(|h| h.ordinal);
        Ok(hits)
    }
}

#[async_trait]
impl ChunkSink for LanceStore {
    async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        LanceStore::upsert_chunks(self, chunks).await
    }

    async fn delete_stale(&self, source: &str, keep_doc_id: &str) -> Result<usize> {
        LanceStore::delete_stale(self, source, keep_doc_id).await
    }

    async fn next_ordinal(&self) -> Result<u64> {
        LanceStore::next_ordinal(self).await
    }

    async fn clear(&self) -> Result<()> {
        LanceStore::clear(self).await
    }
}

#[async_trait]
impl VectorIndex for LanceStore {
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let hits = self.vector_search(query, k).await?;
        Ok(hits.into_iter().map(|h| (h.id, h.score)).collect())
    }

    async fn snapshot(&self) -> Result<Vec<Document>> {
        let hits = self.list_chunks().await?;
        Ok(hits.iter().map(SearchHit::to_document).collect())
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub ordinal: u64,
    pub text: String,
    pub source: String,
    pub heading: String,
    pub metadata_json: String,
    pub score: f32,
}

impl SearchHit {
    pub fn to_document(&self) -> Document {
        ChunkRecord {
            id: self.id.clone(),
            doc_id: self.doc_id.clone(),
            chunk_index: self.chunk_index,
            ordinal: self.ordinal,
            text: self.text.clone(),
            source: self.source.clone(),
            heading: self.heading.clone(),
            vector: Vec::new(),
            metadata_json: self.metadata_json.clone(),
            created_at: 0,
        }
        .to_document()
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Row counts can move under concurrent writers; never report a negative delta.
fn rows_removed(before: usize, after: usize) -> usize {
    before.saturating_sub(after)
}

fn chunk_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("ordinal", DataType::UInt64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("heading", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            true,
        ),
        Field::new("metadata_json", DataType::Utf8, false),
        Field::new("created_at", DataType::Int64, false),
    ]))
}

fn records_to_batch(
    schema: &Arc<Schema>,
    dimension: usize,
    chunks: &[ChunkRecord],
) -> Result<RecordBatch> {
    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let doc_ids: Vec<&str> = chunks.iter().map(|c| c.doc_id.as_str()).collect();
    let chunk_indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    let ordinals: Vec<u64> = chunks.iter().map(|c| c.ordinal).collect();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let headings: Vec<&str> = chunks.iter().map(|c| c.heading.as_str()).collect();
    let metadata_jsons: Vec<&str> = chunks.iter().map(|c| c.metadata_json.as_str()).collect();
    let created_ats: Vec<i64> = chunks.iter().map(|c| c.created_at).collect();

    let flat_vectors: Vec<f32> = chunks.iter().flat_map(|c| c.vector.iter().copied()).collect();
    let values = Float32Array::from(flat_vectors);
    let vector_array = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension as i32,
        Arc::new(values) as Arc<dyn Array>,
        None,
    )?;

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt64Array::from(ordinals)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(headings)),
            Arc::new(vector_array) as Arc<dyn Array>,
            Arc::new(StringArray::from(metadata_jsons)),
            Arc::new(Int64Array::from(created_ats)),
        ],
    )?;
    Ok(batch)
}

/// Extract SearchHit records from Arrow RecordBatches.
fn extract_hits_from_batches(batches: &[RecordBatch], default_score: f32) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let strings = |name: &str| {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        };
        let ids = strings("id");
        let texts = strings("text");
        let sources = strings("source");
        let headings = strings("heading");
        let doc_ids = strings("doc_id");
        let metadata_jsons = strings("metadata_json");
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let ordinals = batch
            .column_by_name("ordinal")
            .and_then(|c| c.as_any().downcast_ref::<UInt64Array>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(texts), Some(sources)) = (ids, texts, sources) else {
            continue;
        };

        for i in 0..batch.num_rows() {
            // cosine distance lies in [0, 2]
            let score = if let Some(d) = distances {
                1.0 - d.value(i)
            } else {
                default_score
            };

            hits.push(SearchHit {
                id: ids.value(i).to_string(),
                doc_id: doc_ids.map(|d| d.value(i).to_string()).unwrap_or_default(),
                chunk_index: chunk_indices.map(|c| c.value(i)).unwrap_or(0),
                ordinal: ordinals.map(|o| o.value(i)).unwrap_or(0),
                text: texts.value(i).to_string(),
                source: sources.value(i).to_string(),
                heading: headings.map(|h| h.value(i).to_string()).unwrap_or_default(),
                metadata_json: metadata_jsons
                    .map(|m| m.value(i).to_string())
                    .unwrap_or_else(|| "{}".to_string()),
                score,
            });
        }
    }
    hits
}
