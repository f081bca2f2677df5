use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use localqa_core::config::{EmbedBackend, EmbedSettings};
use localqa_core::traits::Embedder;
use localqa_core::Error;

pub mod device;
mod fake;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use fake::FakeEmbedder;
pub use pool::masked_mean_l2;
use tokenize::{pad_token_id, tokenize_batch_on_device};

enum Encoder {
    Bert(BertModel),
    XlmRoberta(XLMRobertaModel),
}

/// Sentence encoder loaded from a local HuggingFace model directory.
///
/// Expects `config.json`, `tokenizer.json` and either `model.safetensors` or
/// `pytorch_model.bin`. Output vectors are mean-pooled and L2-normalized.
pub struct EmbeddingModel {
    encoder: Encoder,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
    pad_id: u32,
    query_prefix: String,
    passage_prefix: String,
}

impl EmbeddingModel {
    pub fn load(settings: &EmbedSettings, device: &Device) -> Result<Self> {
        let model_dir = settings.model_dir();
        if !model_dir.is_dir() {
            return Err(Error::embedding_model(&model_dir, "model directory does not exist").into());
        }
        Self::load_from_dir(settings, &model_dir, device)
            .map_err(|e| Error::embedding_model(&model_dir, format!("{e:#}")).into())
    }

    fn load_from_dir(settings: &EmbedSettings, model_dir: &Path, device: &Device) -> Result<Self> {
        info!("Loading embedding model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let weights = load_weights(model_dir, device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, device);
        let (encoder, backend_name) = match settings.backend {
            EmbedBackend::Bert => {
                let config: BertConfig = serde_json::from_str(&raw_config)?;
                (Encoder::Bert(BertModel::load(vb, &config)?), "bert")
            }
            EmbedBackend::XlmRoberta => {
                let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
                (Encoder::XlmRoberta(XLMRobertaModel::new(&config, vb)?), "xlm-roberta")
            }
            EmbedBackend::Fake => return Err(anyhow!("fake backend has no model directory")),
        };
        let model_name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let pad_id = pad_token_id(&tokenizer);
        info!("Embedding model {} loaded (dim={})", model_name, dim);
        Ok(Self {
            encoder,
            tokenizer,
            device: device.clone(),
            id: format!("{backend_name}:{model_name}:d{dim}"),
            dim,
            max_len: settings.max_len,
            pad_id,
            query_prefix: settings.query_prefix.clone(),
            passage_prefix: settings.passage_prefix.clone(),
        })
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize_batch_on_device(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = match &self.encoder {
            Encoder::Bert(model) => model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?,
            Encoder::XlmRoberta(model) => {
                model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?
            }
        };
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        debug!("Embedded {} texts in {:?}", texts.len(), start.elapsed());
        Ok(vectors)
    }
}

impl Embedder for EmbeddingModel {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", self.passage_prefix, t)).collect();
        self.encode(&prefixed)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[format!("{}{}", self.query_prefix, text)])?
            .pop()
            .ok_or_else(|| anyhow!("embedding model returned no vector for the query"))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors_path = model_dir.join("model.safetensors");
    if safetensors_path.exists() {
        debug!("Loading weights from {}", safetensors_path.display());
        return Ok(candle_core::safetensors::load(&safetensors_path, device)?);
    }
    let pickle_path = model_dir.join("pytorch_model.bin");
    if pickle_path.exists() {
        debug!("Loading weights from {}", pickle_path.display());
        let mut weights = HashMap::new();
        for (name, tensor) in candle_core::pickle::read_all(&pickle_path)? {
            weights.insert(name, tensor.to_device(device)?);
        }
        return Ok(weights);
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

/// Build the embedder selected by `settings.backend`.
///
/// `fake` needs no model files and is meant for tests and dry runs.
pub fn load_embedder(settings: &EmbedSettings, device: &Device) -> Result<Box<dyn Embedder>> {
    match settings.backend {
        EmbedBackend::Fake => {
            info!("Using FakeEmbedder (dim={})", settings.fake_dim);
            Ok(Box::new(FakeEmbedder::new(settings.fake_dim)))
        }
        EmbedBackend::Bert | EmbedBackend::XlmRoberta => Ok(Box::new(EmbeddingModel::load(settings, device)?)),
    }
}

