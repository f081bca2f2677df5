//! Domain types shared by the ingestion and query pipelines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type ChunkId = String;

/// A UTF-8 text file read from the documents directory.
///
/// `id` is the path relative to the documents directory with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub content: String,
}

/// A chunk of a source document that is independently embedded and retrieved.
///
/// - `id`: `"{doc_id}:{chunk_index}"`
/// - `doc_id`: stable document identity (relative path)
/// - `doc_path`: original path to the source file
/// - `content`: the text payload, always `document[start..end]`
/// - `chunk_index`/`total_chunks`: position within the parent document
/// - `start`/`end`: byte offsets into the parent document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start: usize,
    pub end: usize,
}

/// A chunk returned by nearest-neighbour search.
///
/// `score` is `1 - cosine_distance`; higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: Role::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
}

/// Sampling parameters passed through to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 1024, temperature: 0.8, top_p: Some(0.95), repeat_penalty: 1.1, repeat_last_n: 64, seed: 299_792_458 }
    }
}
