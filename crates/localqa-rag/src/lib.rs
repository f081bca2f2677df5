//! Ingestion and question-answering pipelines over a local document index.

pub mod ingest;
pub mod prompt;
pub mod query;

pub use ingest::{ingest_directory, IngestReport};
pub use prompt::build_messages;
pub use query::{open_context, Answer, ContextSource, ContextState, ContextUnavailable, QueryPipeline, RetrievalMode};
