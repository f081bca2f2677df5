use anyhow::Result;
use candle_core::{DType, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::utils::apply_repeat_penalty;

use localqa_core::types::GenerationParams;
use localqa_core::Error;

pub fn sampling_for(params: &GenerationParams) -> Sampling {
    let temperature = params.temperature;
    if temperature <= 0.0 {
        return Sampling::ArgMax;
    }
    match params.top_p {
        Some(p) if p > 0.0 && p < 1.0 => Sampling::TopP { p, temperature },
        _ => Sampling::All { temperature },
    }
}

/// Number of tokens that may still be generated after a prompt of `prompt_tokens`.
pub fn token_budget(prompt_tokens: usize, max_tokens: usize, n_ctx: usize) -> Result<usize> {
    if prompt_tokens >= n_ctx {
        return Err(Error::ContextOverflow { prompt_tokens, n_ctx }.into());
    }
    Ok(max_tokens.min(n_ctx - prompt_tokens))
}

/// Sample the next token from the last-position `logits` (`[1, vocab]`).
pub fn next_token(
    processor: &mut LogitsProcessor,
    logits: &Tensor,
    history: &[u32],
    params: &GenerationParams,
) -> Result<u32> {
    let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
    let logits = if params.repeat_penalty == 1.0 || params.repeat_last_n == 0 {
        logits
    } else {
        let start = history.len().saturating_sub(params.repeat_last_n);
        apply_repeat_penalty(&logits, params.repeat_penalty, &history[start..])?
    };
    Ok(processor.sample(&logits)?)
}
