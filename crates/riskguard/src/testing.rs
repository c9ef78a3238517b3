//! Deterministic stand-ins for the model-backed components, shared by unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingModel;
use crate::llm::{GenerationConfig, LLMConfig, LLMManager, LLMProvider, ProviderInfo};
use crate::rag::{QueryRewriter, RetrievalPipeline};
use crate::reranking::{RelevanceScorer, Reranker};
use crate::search::SemanticRetriever;
use crate::storage::{ChunkSink, DocumentStore, InMemoryVectorIndex};
use crate::types::{ChunkRecord, Document};

/// Provider answering from a rule table: the first rule whose needle occurs in
/// the prompt wins, otherwise the default reply.
pub struct ScriptedLlm {
    default: Option<String>,
    rules: Vec<(String, String)>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    temperatures: Mutex<Vec<f32>>,
}

impl ScriptedLlm {
    pub fn new(default: &str) -> Self {
        Self {
            default: Some(default.to_string()),
            rules: Vec::new(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            temperatures: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self {
            default: None,
            ..Self::new("")
        }
    }

    pub fn on(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.temperatures.lock().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        self.temperatures.lock().push(config.temperature);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let Some(default) = &self.default else {
            return Err(anyhow!("scripted provider failure"));
        };
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| default.clone());
        Ok(reply)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "scripted".to_string(),
            model: "scripted".to_string(),
            is_local: true,
        }
    }
}

const HASH_DIM: usize = 128;

/// Character unigram + bigram hashing embedder. Texts sharing terms land close.
pub struct HashEmbedder {
    fail_queries: bool,
    fail_documents: bool,
    query_calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            fail_queries: false,
            fail_documents: false,
            query_calls: AtomicUsize::new(0),
        }
    }

    /// Documents still embed so an index can be built; queries fail.
    pub fn failing() -> Self {
        Self {
            fail_queries: true,
            ..Self::new()
        }
    }

    /// Queries embed; documents fail, as when ingesting without a model.
    pub fn failing_documents() -> Self {
        Self {
            fail_documents: true,
            ..Self::new()
        }
    }

    /// Number of `embed_query` calls so far.
    pub fn calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn hash_features(text: &str) -> Vec<f32> {
        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        let mut vector = vec![0.0f32; HASH_DIM];
        let mut bump = |feature: &str| {
            let mut hasher = DefaultHasher::new();
            feature.hash(&mut hasher);
            vector[(hasher.finish() % HASH_DIM as u64) as usize] += 1.0;
        };
        for c in &chars {
            bump(&c.to_string());
        }
        for pair in chars.windows(2) {
            bump(&pair.iter().collect::<String>());
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl EmbeddingModel for HashEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(anyhow!("embedding model not loaded"));
        }
        Ok(Self::hash_features(text))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail_documents {
            return Err(anyhow!("embedding model not loaded"));
        }
        Ok(Self::hash_features(text))
    }

    fn dimension(&self) -> usize {
        HASH_DIM
    }
}

/// Chunk table held in a vector, in insertion order.
#[derive(Default)]
pub struct MemoryChunkStore {
    rows: Mutex<Vec<ChunkRecord>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<ChunkRecord> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl ChunkSink for MemoryChunkStore {
    async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        let mut rows = self.rows.lock();
        for chunk in chunks {
            rows.retain(|r| r.id != chunk.id);
            rows.push(chunk);
        }
        Ok(())
    }

    async fn delete_stale(&self, source: &str, keep_doc_id: &str) -> Result<usize> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| r.source != source || r.doc_id == keep_doc_id);
        Ok(before - rows.len())
    }

    async fn next_ordinal(&self) -> Result<u64> {
        Ok(self
            .rows
            .lock()
            .iter()
            .map(|r| r.ordinal + 1)
            .max()
            .unwrap_or(0))
    }

    async fn clear(&self) -> Result<()> {
        self.rows.lock().clear();
        Ok(())
    }
}

/// Scores a passage by how many distinct query characters it contains.
pub struct KeywordScorer;

impl RelevanceScorer for KeywordScorer {
    fn score(&self, query: &str, passage: &str) -> Result<f32> {
        if query.trim().is_empty() {
            return Err(anyhow!("empty query"));
        }
        let mut seen = Vec::new();
        for c in query.chars().filter(|c| !c.is_whitespace()) {
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
        Ok(seen.iter().filter(|c| passage.contains(**c)).count() as f32)
    }
}

pub fn fixture_corpus() -> Vec<Document> {
    vec![
        Document::new(
            "sop-payment",
            "支付拦截解除流程：用户因风控策略导致付款失败时，先核实身份，再提交解除申请，审核通过后恢复支付。",
            "payment.md",
        ),
        Document::new(
            "sop-whitelist",
            "内部测试账号加白流程：仅限 internal_qa 角色申请，填写测试用途与账号 UID，主管审批后策略豁免生效。",
            "whitelist.md",
        ),
        Document::new(
            "sop-freeze",
            "账号冻结申诉：账号因异常登录被冻结时，可在 App 内提交申诉材料，一般 24 小时内处理。",
            "account_freeze.md",
        ),
        Document::new(
            "sop-login",
            "登录异常处理：检测到异地登录时会触发短信验证，验证失败请重置密码。",
            "login.md",
        ),
        Document::new(
            "sop-refund",
            "退款到账时效：风控审核通过后，退款将在 1-3 个工作日原路退回。",
            "refund.md",
        ),
    ]
}

/// A fully wired in-memory retrieval pipeline over [`fixture_corpus`].
pub struct PipelineFixture {
    pub pipeline: Arc<RetrievalPipeline>,
    pub llm: Arc<LLMManager>,
    pub scripted: Arc<ScriptedLlm>,
    pub embedder: Arc<HashEmbedder>,
}

impl PipelineFixture {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(llm: ScriptedLlm) -> FixtureBuilder {
        FixtureBuilder {
            llm,
            corpus: fixture_corpus(),
            reranker: true,
            lexical: true,
            failing_embedder: false,
        }
    }
}

pub struct FixtureBuilder {
    llm: ScriptedLlm,
    corpus: Vec<Document>,
    reranker: bool,
    lexical: bool,
    failing_embedder: bool,
}

impl FixtureBuilder {
    pub fn without_reranker(mut self) -> Self {
        self.reranker = false;
        self
    }

    pub fn without_lexical(mut self) -> Self {
        self.lexical = false;
        self
    }

    pub fn with_corpus(mut self, corpus: Vec<Document>) -> Self {
        self.corpus = corpus;
        self
    }

    pub fn with_failing_embedder(mut self) -> Self {
        self.failing_embedder = true;
        self
    }

    pub fn build(self) -> PipelineFixture {
        let scripted = Arc::new(self.llm);
        let llm = Arc::new(LLMManager::new(LLMConfig::default(), scripted.clone()));

        let embedder = Arc::new(if self.failing_embedder {
            HashEmbedder::failing()
        } else {
            HashEmbedder::new()
        });
        let index = InMemoryVectorIndex::from_documents(self.corpus.clone(), embedder.as_ref())
            .expect("hash embedder never fails on documents");

        let config = RetrievalConfig {
            enable_lexical: self.lexical,
            ..RetrievalConfig::default()
        };
        let reranker = if self.reranker {
            Reranker::new(Arc::new(KeywordScorer))
        } else {
            Reranker::unavailable()
        };

        let pipeline = RetrievalPipeline::new(
            Arc::new(DocumentStore::new(self.corpus)),
            SemanticRetriever::new(embedder.clone(), Arc::new(index)),
            QueryRewriter::new(llm.clone()),
            reranker,
            config,
        );

        PipelineFixture {
            pipeline: Arc::new(pipeline),
            llm,
            scripted,
            embedder,
        }
    }
}
