use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::RelevanceScorer;

/// Cross-encoder reranker over an ONNX export of bge-reranker-base.
pub struct CrossEncoderReranker {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    max_length: usize,
    /// XLM-R exports take no segment ids; BERT exports do.
    uses_token_type_ids: bool,
}

impl CrossEncoderReranker {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let model_path = Self::find_model(model_dir)?;
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !tokenizer_path.exists() {
            return Err(anyhow!(
                "Tokenizer not found at: {}",
                tokenizer_path.display()
            ));
        }

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;

        let model_bytes = std::fs::read(&model_path)?;
        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Opt level: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load reranker model: {:?}", e))?;

        let uses_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        tracing::info!(
            model = %model_path.display(),
            uses_token_type_ids,
            "Cross-encoder reranker loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            max_length: 512,
            uses_token_type_ids,
        })
    }

    fn find_model(model_dir: &Path) -> Result<PathBuf> {
        let candidates = [
            model_dir.join("model_O4.onnx"),
            model_dir.join("model.onnx"),
            model_dir.join("onnx").join("model.onnx"),
        ];
        for path in &candidates {
            if path.exists() {
                return Ok(path.clone());
            }
        }
        Err(anyhow!(
            "No reranker model found in: {}",
            model_dir.display()
        ))
    }
}

impl RelevanceScorer for CrossEncoderReranker {
    /// Score a (query, passage) pair. Higher score = more relevant.
    fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let encoding = self
            .tokenizer
            .encode((query, passage), true)
            .map_err(|e| anyhow!("Tokenization failed: {:?}", e))?;

        let len = encoding.get_ids().len().min(self.max_length);
        let to_i64 = |values: &[u32]| -> Vec<i64> { values[..len].iter().map(|&v| v as i64).collect() };
        let ids = to_i64(encoding.get_ids());
        let mask = to_i64(encoding.get_attention_mask());
        let shape = vec![1, len];

        let input_ids = Value::from_array((shape.clone(), ids))
            .map_err(|e| anyhow!("input_ids: {:?}", e))?;
        let attention_mask = Value::from_array((shape.clone(), mask))
            .map_err(|e| anyhow!("attention_mask: {:?}", e))?;

        let mut session = self.session.lock();
        let outputs = if self.uses_token_type_ids {
            let token_type_ids = Value::from_array((shape, to_i64(encoding.get_type_ids())))
                .map_err(|e| anyhow!("token_type_ids: {:?}", e))?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
        }
        .map_err(|e| anyhow!("Reranker inference failed: {:?}", e))?;

        let (_shape, data) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract logits: {:?}", e))?;

        data.first()
            .copied()
            .ok_or_else(|| anyhow!("Cross-encoder returned empty logits tensor"))
    }
}
