//! BGE-M3 (XLM-RoBERTa) embeddings with candle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use noterag_core::error::Error;
use noterag_core::traits::EmbeddingProvider;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

struct LocalModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl LocalModel {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros(input_ids.dims(), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        let elapsed = start.elapsed().as_millis();
        if elapsed > 100 * texts.len() as u128 {
            warn!(batch = texts.len(), elapsed_ms = elapsed as u64, "slow embedding batch");
        } else {
            debug!(batch = texts.len(), elapsed_ms = elapsed as u64, "embedded batch");
        }
        Ok(vectors)
    }
}

/// Local model provider. Inference runs on the blocking pool.
#[derive(Clone)]
pub struct LocalEmbedder {
    inner: Arc<LocalModel>,
    model_id: String,
    dim: usize,
}

impl LocalEmbedder {
    /// Load `tokenizer.json`, `config.json` and `model.safetensors` (or
    /// `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_text)?;
        let raw: serde_json::Value = serde_json::from_str(&config_text)?;
        let dim = raw
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let dtype = DType::F32;
        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], dtype, &device)? }
        } else {
            let weights_path = model_dir.join("pytorch_model.bin");
            let weights = candle_core::pickle::read_all(&weights_path)
                .with_context(|| format!("Failed to read weights from {}", weights_path.display()))?;
            let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, dtype, &device)
        };
        let model = XLMRobertaModel::new(&config, vb)?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let model_id = format!("local:{name}:d{dim}");
        info!(model_id = %model_id, "embedding model loaded");
        Ok(Self { inner: Arc::new(LocalModel { model, tokenizer, device, max_len }), model_id, dim })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String]) -> noterag_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.clone();
        let texts = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || inner.embed_batch(&texts))
            .await
            .map_err(Error::provider)?
            .map_err(|e| Error::provider(format!("{e:#}")))?;
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        Ok(vectors)
    }
}

/// Model directory from configuration, `APP_MODEL_DIR`, `MODEL_DIR`, or `models/bge-m3`.
pub fn resolve_model_dir(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        if dir.exists() {
            return Ok(dir.to_path_buf());
        }
        warn!(model_dir = %dir.display(), "configured model dir does not exist");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                debug!(source = var, model_dir = %p.display(), "using model dir");
                return Ok(p);
            }
        }
    }
    let default = Path::new("models/bge-m3");
    if default.exists() {
        return Ok(default.to_path_buf());
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
