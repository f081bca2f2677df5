use anyhow::{anyhow, Result};
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use localqa_core::config::{ChatFormat, LlmSettings};
use localqa_core::traits::LanguageModel;
use localqa_core::types::{ChatMessage, GenerationParams};
use localqa_core::Error;

pub mod chat;
pub mod generation;

use generation::{next_token, sampling_for, token_budget};

/// A quantized llama-family model loaded from a local GGUF file.
pub struct QuantizedLlama {
    model: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    chat_format: ChatFormat,
    n_ctx: usize,
    stop_ids: Vec<u32>,
}

impl QuantizedLlama {
    pub fn load(settings: &LlmSettings, device: &Device) -> Result<Self> {
        let model_path = settings.model_path();
        let tokenizer_path = settings.tokenizer_path();
        for path in [&model_path, &tokenizer_path] {
            if !path.is_file() {
                return Err(Error::language_model(path, "file does not exist").into());
            }
        }

        let start = Instant::now();
        info!("Loading language model from {}", model_path.display());
        let model = load_weights(&model_path, settings.n_ctx, device)
            .map_err(|e| Error::language_model(&model_path, format!("{e:#}")))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::language_model(&tokenizer_path, e))?;

        let stop_ids: Vec<u32> = chat::stop_tokens(settings.chat_format)
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();
        if stop_ids.is_empty() {
            return Err(Error::language_model(
                &tokenizer_path,
                format!("tokenizer has none of the stop tokens {:?}", chat::stop_tokens(settings.chat_format)),
            )
            .into());
        }
        info!("Language model ready in {:?}", start.elapsed());
        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            chat_format: settings.chat_format,
            n_ctx: settings.n_ctx,
            stop_ids,
        })
    }

    fn encode_prompt(&self, messages: &[ChatMessage]) -> Result<Vec<u32>> {
        let prompt = chat::render(self.chat_format, messages);
        // The template already carries the BOS marker.
        let encoding = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| anyhow!("Failed to tokenize prompt: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl LanguageModel for QuantizedLlama {
    fn generate(&mut self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String> {
        let prompt_tokens = self.encode_prompt(messages)?;
        let budget = token_budget(prompt_tokens.len(), params.max_tokens, self.n_ctx)?;
        debug!("Prompt is {} tokens, generating up to {}", prompt_tokens.len(), budget);
        if budget == 0 {
            return Ok(String::new());
        }

        let start = Instant::now();
        let mut processor = LogitsProcessor::from_sampling(params.seed, sampling_for(params));
        let mut history = prompt_tokens.clone();
        let mut generated: Vec<u32> = Vec::new();

        // Position 0 also discards the KV cache of the previous answer.
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&input, 0)?;
        let mut next = next_token(&mut processor, &logits, &history, params)?;
        loop {
            if self.stop_ids.contains(&next) {
                break;
            }
            generated.push(next);
            history.push(next);
            if generated.len() >= budget {
                break;
            }
            let input = Tensor::new(&[next], &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, history.len() - 1)?;
            next = next_token(&mut processor, &logits, &history, params)?;
        }

        let elapsed = start.elapsed();
        let rate = generated.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!("Generated {} tokens in {:?} ({:.1} tok/s)", generated.len(), elapsed, rate);
        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| anyhow!("Failed to decode generated tokens: {}", e))?;
        Ok(text.trim().to_string())
    }
}

fn load_weights(model_path: &Path, n_ctx: usize, device: &Device) -> Result<ModelWeights> {
    let mut file = File::open(model_path)?;
    let content = gguf_file::Content::read(&mut file)?;
    if let Some(trained) = content
        .metadata
        .get("llama.context_length")
        .and_then(|v| v.to_u32().ok())
    {
        debug!("Model trained with a {} token context", trained);
        if n_ctx > trained as usize {
            warn!("llm.n_ctx = {} exceeds the model's trained context of {}", n_ctx, trained);
        }
    }
    debug!("GGUF holds {} tensors", content.tensor_infos.len());
    Ok(ModelWeights::from_gguf(content, &mut file, device)?)
}
