use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::Tokenizer;

use super::EmbeddingModel;
use crate::config::EmbeddingConfig;

#[derive(Clone, Debug)]
pub struct BgeM3Config {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub normalize: bool,
}

impl BgeM3Config {
    /// Locate an exported BGE-M3 ONNX graph and its `tokenizer.json` under `model_dir`.
    pub fn auto_detect(config: &EmbeddingConfig) -> Option<Self> {
        let dir = config.model_dir.as_path();
        let model_file = ["model_O4.onnx", "model.onnx", "onnx/model.onnx"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())?;

        let tokenizer_path = dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return None;
        }

        Some(Self {
            model_path: model_file,
            tokenizer_path,
            dimension: config.dimension,
            max_length: config.max_length.min(8192),
            normalize: true,
        })
    }
}

/// Dense BGE-M3 embeddings. Queries and passages share one encoder without prefixes.
pub struct BgeM3Embeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    config: BgeM3Config,
}

impl BgeM3Embeddings {
    pub fn new(config: BgeM3Config) -> Result<Self> {
        ort::init().with_name("bge_m3_embeddings").commit();

        if !config.model_path.exists() {
            return Err(anyhow!(
                "Model file not found at: {}",
                config.model_path.display()
            ));
        }

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        tracing::info!(
            model = %config.model_path.display(),
            dimension = config.dimension,
            "BGE-M3 embedder loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let len = encoding.get_ids().len().min(self.config.max_length);
        let ids: Vec<i64> = encoding.get_ids()[..len].iter().map(|&x| x as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask()[..len]
            .iter()
            .map(|&x| x as i64)
            .collect();

        let shape = vec![1, len];
        let input_ids = Value::from_array((shape.clone(), ids))
            .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
        let attention_mask = Value::from_array((shape, mask))
            .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
            .map_err(|e| anyhow!("Inference failed: {:?}", e))?;

        // Some exports ship a pooled dense head; otherwise pool the CLS token.
        let pooled_name = outputs
            .iter()
            .map(|(name, _)| name.to_string())
            .find(|name| name == "sentence_embedding" || name == "dense_vecs");

        let embedding = if let Some(name) = pooled_name {
            let (_, data) = outputs[name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract '{}': {:?}", name, e))?;
            data.to_vec()
        } else {
            let (shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract last_hidden_state: {:?}", e))?;
            if shape.len() != 3 {
                return Err(anyhow!("Unexpected hidden state rank: {}", shape.len()));
            }
            cls_pool(data, shape[2] as usize)
        };

        if embedding.len() != self.config.dimension {
            return Err(anyhow!(
                "Model produced {}-d vectors, configured dimension is {}",
                embedding.len(),
                self.config.dimension
            ));
        }

        Ok(if self.config.normalize {
            l2_normalize(embedding)
        } else {
            embedding
        })
    }
}

impl EmbeddingModel for BgeM3Embeddings {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

/// First token of the first sequence in a `[batch, seq, dim]` buffer.
fn cls_pool(hidden: &[f32], hidden_dim: usize) -> Vec<f32> {
    hidden.iter().take(hidden_dim).copied().collect()
}

pub(crate) fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}
