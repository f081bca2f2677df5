//! Prompt templates for instruction-tuned GGUF models.

use localqa_core::config::ChatFormat;
use localqa_core::types::ChatMessage;

/// Render `messages` and leave an open assistant turn for the model to complete.
pub fn render(format: ChatFormat, messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    match format {
        ChatFormat::Llama3 => {
            out.push_str("<|begin_of_text|>");
            for m in messages {
                out.push_str(&format!("<|start_header_id|>{}<|end_header_id|>\n\n{}<|eot_id|>", m.role.as_str(), m.content));
            }
            out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        }
        ChatFormat::ChatMl => {
            for m in messages {
                out.push_str(&format!("<|im_start|>{}\n{}<|im_end|>\n", m.role.as_str(), m.content));
            }
            out.push_str("<|im_start|>assistant\n");
        }
    }
    out
}

/// Tokens that end the assistant turn.
pub fn stop_tokens(format: ChatFormat) -> &'static [&'static str] {
    match format {
        ChatFormat::Llama3 => &["<|eot_id|>", "<|end_of_text|>"],
        ChatFormat::ChatMl => &["<|im_end|>", "<|endoftext|>"],
    }
}
