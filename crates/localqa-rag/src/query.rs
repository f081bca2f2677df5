use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use localqa_core::config::PromptSettings;
use localqa_core::traits::{Embedder, LanguageModel, VectorSearch};
use localqa_core::types::{GenerationParams, ScoredChunk};
use localqa_vector::VectorIndex;

use crate::prompt::build_messages;

/// How a question is answered, decided once per question.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalMode {
    WithContext(Vec<ScoredChunk>),
    NoContext,
}

impl RetrievalMode {
    pub fn is_rag(&self) -> bool { matches!(self, RetrievalMode::WithContext(_)) }

    pub fn sources(&self) -> &[ScoredChunk] {
        match self {
            RetrievalMode::WithContext(chunks) => chunks,
            RetrievalMode::NoContext => &[],
        }
    }
}

/// Why answers are produced without retrieved context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextUnavailable {
    NoIndex { index_dir: PathBuf },
    EmptyIndex { index_dir: PathBuf },
    Unloadable { index_dir: PathBuf, reason: String },
    EmbedderMismatch { indexed_with: String, current: String },
}

impl fmt::Display for ContextUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextUnavailable::NoIndex { index_dir } => {
                write!(f, "no documents ingested yet (no index at {})", index_dir.display())
            }
            ContextUnavailable::EmptyIndex { index_dir } => {
                write!(f, "no documents ingested yet (index at {} is empty)", index_dir.display())
            }
            ContextUnavailable::Unloadable { index_dir, reason } => {
                write!(f, "index at {} could not be loaded: {}", index_dir.display(), reason)
            }
            ContextUnavailable::EmbedderMismatch { indexed_with, current } => write!(
                f,
                "index was built with embedder {indexed_with} but {current} is configured; re-run ingestion"
            ),
        }
    }
}

/// A loaded index together with the embedder that matches it.
pub struct ContextSource {
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorSearch>,
}

impl ContextSource {
    pub fn new(embedder: Box<dyn Embedder>, index: Box<dyn VectorSearch>) -> Self { Self { embedder, index } }
}

pub enum ContextState {
    Ready(ContextSource),
    Unavailable(ContextUnavailable),
}

impl ContextState {
    pub fn is_ready(&self) -> bool { matches!(self, ContextState::Ready(_)) }
}

/// Inspect `index_dir` and, when a usable index is there, load the embedder.
///
/// Only a failing `load_embedder` is an error; every problem with the index
/// itself degrades to [`ContextState::Unavailable`].
pub async fn open_context<F>(index_dir: &Path, load_embedder: F) -> Result<ContextState>
where
    F: FnOnce() -> Result<Box<dyn Embedder>>,
{
    let index = match VectorIndex::open(index_dir).await {
        Ok(Some(index)) => index,
        Ok(None) => {
            info!("No index found at {}", index_dir.display());
            return Ok(ContextState::Unavailable(ContextUnavailable::NoIndex { index_dir: index_dir.to_path_buf() }));
        }
        Err(e) => {
            warn!("Index at {} could not be loaded: {:#}", index_dir.display(), e);
            return Ok(ContextState::Unavailable(ContextUnavailable::Unloadable {
                index_dir: index_dir.to_path_buf(),
                reason: format!("{e:#}"),
            }));
        }
    };
    if index.is_empty() {
        info!("Index at {} holds no chunks", index_dir.display());
        return Ok(ContextState::Unavailable(ContextUnavailable::EmptyIndex { index_dir: index_dir.to_path_buf() }));
    }

    let embedder = load_embedder()?;
    let manifest = index.manifest();
    if embedder.id() != manifest.embedder_id || embedder.dim() != manifest.dim {
        warn!("Index embedder {} (d{}) does not match {} (d{})", manifest.embedder_id, manifest.dim, embedder.id(), embedder.dim());
        return Ok(ContextState::Unavailable(ContextUnavailable::EmbedderMismatch {
            indexed_with: manifest.embedder_id.clone(),
            current: embedder.id().to_string(),
        }));
    }
    Ok(ContextState::Ready(ContextSource::new(embedder, Box::new(index))))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub mode: RetrievalMode,
}

pub struct QueryPipeline {
    llm: Box<dyn LanguageModel>,
    context: ContextState,
    top_k: usize,
    params: GenerationParams,
    prompts: PromptSettings,
}

impl QueryPipeline {
    pub fn new(
        llm: Box<dyn LanguageModel>,
        context: ContextState,
        top_k: usize,
        params: GenerationParams,
        prompts: PromptSettings,
    ) -> Self {
        Self { llm, context, top_k, params, prompts }
    }

    /// Retrieve context for `question`, or [`RetrievalMode::NoContext`] when none is available.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalMode> {
        let source = match &self.context {
            ContextState::Ready(source) => source,
            ContextState::Unavailable(_) => return Ok(RetrievalMode::NoContext),
        };
        let query_vec = source.embedder.embed_query(question)?;
        let hits = source.index.search_vec(&query_vec, self.top_k).await?;
        for (rank, hit) in hits.iter().enumerate() {
            debug!("#{} score={:.4} id={}", rank + 1, hit.score, hit.chunk.id);
        }
        if hits.is_empty() {
            return Ok(RetrievalMode::NoContext);
        }
        Ok(RetrievalMode::WithContext(hits))
    }

    pub async fn answer(&mut self, question: &str) -> Result<Answer> {
        let mode = self.retrieve(question).await?;
        let messages = build_messages(&mode, question, &self.prompts);
        let text = self.llm.generate(&messages, &self.params)?;
        Ok(Answer { text, mode })
    }
}
