//! Wires configuration into a ready-to-serve agent.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use crate::agent::{AgentGraph, FaqTable, JsonUserDirectory};
use crate::config::AgentConfig;
use crate::embeddings::{BgeM3Config, BgeM3Embeddings, EmbeddingModel};
use crate::error::AgentError;
use crate::indexing::Indexer;
use crate::llm::LLMManager;
use crate::rag::{Evaluator, QueryRewriter, RetrievalPipeline};
use crate::reranking::Reranker;
use crate::search::SemanticRetriever;
use crate::storage::{DocumentStore, LanceStore};

pub struct Engine {
    config: AgentConfig,
    llm: Arc<LLMManager>,
    pipeline: Arc<RetrievalPipeline>,
    graph: AgentGraph,
}

impl Engine {
    /// Load every collaborator. The corpus snapshot is taken once, here.
    pub async fn new(config: AgentConfig) -> Result<Self> {
        config.validate().map_err(AgentError::Config)?;

        let llm = Arc::new(LLMManager::from_config(config.llm.clone())?);
        let embedder = load_embedder(&config)?;
        let store = open_store(&config).await?;

        let documents = DocumentStore::load(store.as_ref())
            .await
            .context("Failed to read corpus snapshot")?;
        if documents.is_empty() {
            tracing::warn!(
                index_dir = %config.index_dir.display(),
                "Vector table is empty, run `ingest` first"
            );
        }

        let rewriter = if config.retrieval.enable_query_rewrite {
            QueryRewriter::new(llm.clone())
        } else {
            QueryRewriter::disabled()
        };

        let pipeline = Arc::new(RetrievalPipeline::new(
            Arc::new(documents),
            SemanticRetriever::new(embedder, store),
            rewriter,
            Reranker::load(&config.reranker),
            config.retrieval.clone(),
        ));

        let directory = JsonUserDirectory::load(&config.user_db_path)?;
        let faq = match FaqTable::load(&config.faq_path) {
            Ok(faq) => faq,
            Err(e) => {
                tracing::warn!(error = %e, "FAQ table unavailable, continuing without FAQ shortcut");
                FaqTable::default()
            }
        };

        let graph = AgentGraph::new(
            Arc::new(directory),
            faq,
            pipeline.clone(),
            llm.clone(),
            config.agent.clone(),
        );

        Ok(Self {
            config,
            llm,
            pipeline,
            graph,
        })
    }

    /// Ingestion only needs the embedder and the vector table.
    pub async fn indexer(config: &AgentConfig) -> Result<Indexer> {
        config.validate().map_err(AgentError::Config)?;
        let embedder = load_embedder(config)?;
        let store = open_store(config).await?;
        Ok(Indexer::new(embedder, store))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn graph(&self) -> &AgentGraph {
        &self.graph
    }

    pub fn pipeline(&self) -> &Arc<RetrievalPipeline> {
        &self.pipeline
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.pipeline.clone(), self.llm.clone())
    }
}

fn load_embedder(config: &AgentConfig) -> Result<Arc<dyn EmbeddingModel>> {
    let bge = BgeM3Config::auto_detect(&config.embedding).ok_or_else(|| {
        anyhow!(
            "No embedding model available. Place BGE-M3 (model.onnx + tokenizer.json) in: {}",
            config.embedding.model_dir.display()
        )
    })?;
    let embedder = BgeM3Embeddings::new(bge).context("Failed to load BGE-M3 embeddings")?;
    Ok(Arc::new(embedder))
}

async fn open_store(config: &AgentConfig) -> Result<Arc<LanceStore>> {
    let store = LanceStore::new(&config.index_dir, config.embedding.dimension)
        .await
        .context("Failed to initialize LanceDB store")?;
    Ok(Arc::new(store))
}
