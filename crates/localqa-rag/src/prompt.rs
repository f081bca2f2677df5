use localqa_core::config::{PromptSettings, CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER};
use localqa_core::types::{ChatMessage, ScoredChunk};

use crate::query::RetrievalMode;

/// `[system, user]` messages for one question.
///
/// With context the user turn is the RAG template; without it the user turn
/// is the bare question.
pub fn build_messages(mode: &RetrievalMode, question: &str, prompts: &PromptSettings) -> Vec<ChatMessage> {
    let user = match mode {
        RetrievalMode::WithContext(chunks) => {
            let context = format_context(chunks, &prompts.context_separator);
            fill_template(&prompts.rag_template, &context, question)
        }
        RetrievalMode::NoContext => question.to_string(),
    };
    vec![ChatMessage::system(prompts.system.clone()), ChatMessage::user(user)]
}

pub fn format_context(chunks: &[ScoredChunk], separator: &str) -> String {
    chunks.iter().map(|c| c.chunk.content.as_str()).collect::<Vec<_>>().join(separator)
}

/// Substitute both placeholders in one pass, so text inside the context or
/// the question is never treated as a placeholder.
fn fill_template(template: &str, context: &str, question: &str) -> String {
    template
        .split(CONTEXT_PLACEHOLDER)
        .map(|piece| piece.replace(QUESTION_PLACEHOLDER, question))
        .collect::<Vec<_>>()
        .join(context)
}
