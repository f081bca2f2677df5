use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunking::{split_spans, ChunkingConfig};
use crate::config::IngestSettings;
use crate::error::Error;
use crate::types::{Document, DocumentChunk};

/// A file that was found but could not be used as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ProcessedDirectory {
    pub documents: usize,
    pub chunks: Vec<DocumentChunk>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
    recursive: bool,
    extensions: Vec<String>,
}

impl Default for DataProcessor {
    fn default() -> Self {
        Self { chunking_config: ChunkingConfig::default(), recursive: false, extensions: vec!["txt".to_string()] }
    }
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn from_settings(settings: &IngestSettings) -> Result<Self> {
        Ok(Self {
            chunking_config: ChunkingConfig::new(settings.chunk_size, settings.chunk_overlap)?,
            recursive: settings.recursive,
            extensions: settings.extensions.iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect(),
        })
    }

    pub fn chunking_config(&self) -> &ChunkingConfig { &self.chunking_config }

    /// Read and chunk every document under `data_dir`.
    ///
    /// Undecodable, unreadable or empty files are skipped and reported, never fatal.
    /// A missing `data_dir` is an error.
    pub fn process_directory(&self, data_dir: &Path) -> Result<ProcessedDirectory> {
        let (documents, skipped) = self.load_documents(data_dir)?;
        let mut out = ProcessedDirectory { documents: 0, chunks: Vec::new(), skipped };
        for doc in &documents {
            let chunks = self.chunk_document(doc);
            if chunks.is_empty() {
                info!("Skipping {}: empty document", doc.path.display());
                out.skipped.push(SkippedFile { path: doc.path.clone(), reason: "empty document".to_string() });
                continue;
            }
            debug!(doc = %doc.id, chunks = chunks.len(), "chunked document");
            out.documents += 1;
            out.chunks.extend(chunks);
        }
        info!("Processed {} files into {} chunks", out.documents, out.chunks.len());
        Ok(out)
    }

    pub fn load_documents(&self, data_dir: &Path) -> Result<(Vec<Document>, Vec<SkippedFile>)> {
        if !data_dir.is_dir() {
            return Err(Error::NotFound(format!("documents directory {}", data_dir.display())).into());
        }
        let (files, mut skipped) = self.list_document_files(data_dir);
        if files.is_empty() {
            info!("No documents found under {}", data_dir.display());
        }
        let mut documents = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!("Reading file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            match read_utf8(file_path) {
                Ok(content) => documents.push(Document { id: doc_id_for(file_path, data_dir), path: file_path.clone(), content }),
                Err(reason) => {
                    warn!("Skipping {}: {}", file_path.display(), reason);
                    skipped.push(SkippedFile { path: file_path.clone(), reason });
                }
            }
        }
        info!("Loaded {} documents from {}", documents.len(), data_dir.display());
        Ok((documents, skipped))
    }

    pub fn chunk_document(&self, doc: &Document) -> Vec<DocumentChunk> {
        if doc.content.trim().is_empty() {
            return Vec::new();
        }
        let spans = split_spans(&doc.content, &self.chunking_config);
        let total_chunks = spans.len();
        let doc_path = doc.path.to_string_lossy().to_string();
        spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| DocumentChunk {
                id: format!("{}:{}", doc.id, chunk_index),
                doc_id: doc.id.clone(),
                doc_path: doc_path.clone(),
                content: doc.content[span.start..span.end].to_string(),
                chunk_index,
                total_chunks,
                start: span.start,
                end: span.end,
            })
            .collect()
    }

    /// Matching files under `root` (symlinks followed), plus entries the walk could not read.
    fn list_document_files(&self, root: &Path) -> (Vec<PathBuf>, Vec<SkippedFile>) {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let walker = walkdir::WalkDir::new(root)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    warn!("Skipping {}: {}", path.display(), e);
                    skipped.push(SkippedFile { path, reason: e.to_string() });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
            if matches {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        (files, skipped)
    }
}

fn read_utf8(path: &Path) -> std::result::Result<String, String> {
    let bytes = fs::read(path).map_err(|e| format!("read failed: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8 ({e})"))
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn doc_id_for(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
