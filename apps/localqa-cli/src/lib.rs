//! Argument parsing and console output shared by `localqa-ingest` and `localqa-query`.

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use localqa_core::config::{Config, Settings};
use localqa_core::Error;
use localqa_rag::{Answer, IngestReport};

const PREVIEW_CHARS: usize = 200;

/// Log to stderr so stdout only carries answers. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(config: Option<&Path>, apply: impl FnOnce(&mut Settings)) -> Result<Settings> {
    let mut settings = Config::load_from(config)?.settings()?;
    apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn path_string(p: &Path) -> String { p.to_string_lossy().into_owned() }

#[derive(Parser, Debug)]
#[command(name = "localqa-ingest")]
#[command(about = "Chunk and embed the .txt files of a directory into a local vector index")]
#[command(version)]
pub struct IngestArgs {
    /// Directory holding the documents (default: data.documents_dir)
    pub documents_dir: Option<PathBuf>,
    /// Where the index is written (default: data.index_dir)
    #[arg(long)]
    pub index_dir: Option<PathBuf>,
    /// Maximum chunk length in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,
    /// Characters shared by neighbouring chunks
    #[arg(long)]
    pub chunk_overlap: Option<usize>,
    /// Also read files in subdirectories
    #[arg(long)]
    pub recursive: bool,
    /// Extra TOML config file layered over config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl IngestArgs {
    pub fn settings(&self) -> Result<Settings> {
        load_settings(self.config.as_deref(), |s| {
            if let Some(dir) = &self.documents_dir { s.data.documents_dir = path_string(dir); }
            if let Some(dir) = &self.index_dir { s.data.index_dir = path_string(dir); }
            if let Some(n) = self.chunk_size { s.ingest.chunk_size = n; }
            if let Some(n) = self.chunk_overlap { s.ingest.chunk_overlap = n; }
            if self.recursive { s.ingest.recursive = true; }
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "localqa-query")]
#[command(about = "Answer questions with a local language model, using the document index when one exists")]
#[command(version)]
pub struct QueryArgs {
    /// Question to answer once; without it an interactive prompt starts
    #[arg(conflicts_with = "question_flag")]
    pub question: Option<String>,
    #[arg(short = 'q', long = "question", id = "question_flag", value_name = "QUESTION")]
    pub question_flag: Option<String>,
    #[arg(long)]
    pub index_dir: Option<PathBuf>,
    /// Number of chunks passed to the model as context
    #[arg(long)]
    pub top_k: Option<usize>,
    /// GGUF model file
    #[arg(long)]
    pub model: Option<PathBuf>,
    /// tokenizer.json matching the model
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,
    #[arg(long)]
    pub max_tokens: Option<usize>,
    #[arg(long)]
    pub temperature: Option<f64>,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl QueryArgs {
    pub fn question(&self) -> Option<&str> {
        self.question.as_deref().or(self.question_flag.as_deref())
    }

    pub fn settings(&self) -> Result<Settings> {
        load_settings(self.config.as_deref(), |s| {
            if let Some(dir) = &self.index_dir { s.data.index_dir = path_string(dir); }
            if let Some(k) = self.top_k { s.retrieval.top_k = k; }
            if let Some(p) = &self.model { s.llm.model_path = path_string(p); }
            if let Some(p) = &self.tokenizer { s.llm.tokenizer_path = path_string(p); }
            if let Some(n) = self.max_tokens { s.llm.max_tokens = n; }
            if let Some(t) = self.temperature { s.llm.temperature = t; }
        })
    }
}

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Whether the interactive session may go on after `err` failed one question.
///
/// Only a prompt that does not fit the context window is tied to the question
/// itself; any other failure ends the session.
pub fn is_recoverable_question_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| matches!(cause.downcast_ref::<Error>(), Some(Error::ContextOverflow { .. })))
}

/// First `PREVIEW_CHARS` characters of `text`, marked when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Next line typed by the user, or `None` at end of input.
pub fn read_question() -> Result<Option<String>> {
    if io::stdin().is_terminal() {
        let input = dialoguer::Input::<String>::new()
            .with_prompt("Question ('exit' to quit)")
            .allow_empty(true)
            .interact_text();
        return match input {
            Ok(line) => Ok(Some(line)),
            Err(dialoguer::Error::IO(e)) if matches!(e.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e.into()),
        };
    }
    print!("\nQuestion ('exit' to quit): ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

pub fn print_answer(answer: &Answer) {
    println!("\n📝 Answer:\n{}", answer.text);
    let sources = answer.mode.sources();
    if sources.is_empty() {
        return;
    }
    println!("\n📄 Sources:");
    for (i, hit) in sources.iter().enumerate() {
        println!("\n  {}. score={:.4}  source={}", i + 1, hit.score, hit.chunk.doc_path);
        println!("     {}", preview(&hit.chunk.content));
    }
}

pub fn print_ingest_report(report: &IngestReport) {
    for skipped in &report.skipped {
        println!("⚠️  Skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    println!("\n✅ Ingestion completed!");
    println!("📊 {} documents, {} chunks", report.documents, report.chunks);
    println!("💾 Index saved to {}", report.index_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_args_parse_positional_dir_and_flags() {
        let args = IngestArgs::try_parse_from(["localqa-ingest", "docs", "--chunk-size", "800", "--chunk-overlap", "80", "--recursive"]).unwrap();
        assert_eq!(args.documents_dir, Some(PathBuf::from("docs")));
        assert_eq!(args.chunk_size, Some(800));
        assert_eq!(args.chunk_overlap, Some(80));
        assert!(args.recursive);
        assert!(args.index_dir.is_none());
    }

    #[test]
    fn query_question_from_positional_or_flag() {
        let positional = QueryArgs::try_parse_from(["localqa-query", "What is 2+2?"]).unwrap();
        assert_eq!(positional.question(), Some("What is 2+2?"));
        let flag = QueryArgs::try_parse_from(["localqa-query", "-q", "Why?", "--top-k", "5"]).unwrap();
        assert_eq!(flag.question(), Some("Why?"));
        assert_eq!(flag.top_k, Some(5));
        let none = QueryArgs::try_parse_from(["localqa-query"]).unwrap();
        assert_eq!(none.question(), None);
    }

    #[test]
    fn query_rejects_two_questions() {
        assert!(QueryArgs::try_parse_from(["localqa-query", "a", "--question", "b"]).is_err());
    }

    #[test]
    fn exit_commands_are_case_insensitive() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command(" QUIT \n"));
        assert!(!is_exit_command("exit now"));
    }

    #[test]
    fn only_context_overflow_keeps_the_session_going() {
        let overflow: anyhow::Error = Error::ContextOverflow { prompt_tokens: 3000, n_ctx: 2048 }.into();
        assert!(is_recoverable_question_error(&overflow));
        assert!(is_recoverable_question_error(&overflow.context("answering question")));

        let fatal = [
            anyhow::Error::from(Error::Operation("search failed".into())),
            Error::language_model("/models/llama.gguf", "decode failed").into(),
            anyhow::anyhow!("lance table vanished"),
        ];
        for err in &fatal {
            assert!(!is_recoverable_question_error(err), "{err:#}");
        }
    }

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(250);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 203);
    }
}
