use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to load embedding model from {}: {reason}", path.display())]
    EmbeddingModel { path: PathBuf, reason: String },

    #[error("Failed to load language model from {}: {reason}", path.display())]
    LanguageModel { path: PathBuf, reason: String },

    #[error("Failed to write index to {}: {reason}", path.display())]
    IndexWrite { path: PathBuf, reason: String },

    #[error("Prompt is {prompt_tokens} tokens but the context window is {n_ctx} tokens")]
    ContextOverflow { prompt_tokens: usize, n_ctx: usize },

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn embedding_model(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::EmbeddingModel { path: path.into(), reason: reason.to_string() }
    }

    pub fn language_model(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::LanguageModel { path: path.into(), reason: reason.to_string() }
    }

    pub fn index_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::IndexWrite { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
