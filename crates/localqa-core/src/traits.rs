use async_trait::async_trait;

use crate::types::{ChatMessage, GenerationParams, ScoredChunk};

pub trait Embedder: Send + Sync {
    /// Stable identifier recorded in the index manifest (e.g. `bert:multilingual-e5-small:d384`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Embed document passages. Vectors are L2-normalized.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a search query. Models trained with asymmetric prefixes override this.
    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for the query"))
    }
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Number of chunks held by the index.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    async fn search_vec(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<ScoredChunk>>;
}

pub trait LanguageModel {
    /// Generate one complete reply for the conversation.
    fn generate(&mut self, messages: &[ChatMessage], params: &GenerationParams) -> anyhow::Result<String>;
}
