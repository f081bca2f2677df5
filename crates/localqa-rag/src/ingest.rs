use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use localqa_core::config::IngestSettings;
use localqa_core::data_processor::{DataProcessor, SkippedFile};
use localqa_core::traits::Embedder;
use localqa_core::types::DocumentChunk;
use localqa_core::Error;
use localqa_vector::{IndexManifest, IndexWriter};

/// Outcome of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
    pub index_dir: PathBuf,
    pub manifest: IndexManifest,
}

/// Rebuild the index at `writer.index_dir()` from every document in `documents_dir`.
///
/// Undecodable files end up in [`IngestReport::skipped`]. An existing but
/// empty directory still produces a valid, empty index.
pub async fn ingest_directory(
    documents_dir: &Path,
    settings: &IngestSettings,
    embedder: &dyn Embedder,
    writer: &IndexWriter,
) -> Result<IngestReport> {
    let processor = DataProcessor::from_settings(settings)?;
    let processed = processor.process_directory(documents_dir)?;

    let embeddings = embed_chunks(embedder, &processed.chunks, settings.batch_size)?;
    let cfg = processor.chunking_config();
    let manifest = IndexManifest::new(embedder.id(), embedder.dim(), cfg.max_chars, cfg.overlap_chars, processed.documents);
    let manifest = writer.write(&processed.chunks, &embeddings, manifest).await?;

    info!(
        "Ingested {} documents ({} chunks, {} skipped) into {}",
        processed.documents,
        processed.chunks.len(),
        processed.skipped.len(),
        writer.index_dir().display()
    );
    Ok(IngestReport {
        documents: processed.documents,
        chunks: processed.chunks.len(),
        skipped: processed.skipped,
        index_dir: writer.index_dir().to_path_buf(),
        manifest,
    })
}

/// Embed chunk contents in batches of `batch_size`, preserving order.
pub fn embed_chunks(embedder: &dyn Embedder, chunks: &[DocumentChunk], batch_size: usize) -> Result<Vec<Vec<f32>>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut out = Vec::with_capacity(chunks.len());
    for (batch_index, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::Operation(format!("embedder returned {} vectors for {} texts", vectors.len(), texts.len())).into());
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dim()) {
            return Err(Error::Operation(format!("embedder returned a vector of dim {}, expected {}", v.len(), embedder.dim())).into());
        }
        debug!("Embedded batch {} ({} chunks)", batch_index + 1, batch.len());
        out.extend(vectors);
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("embedded");
    Ok(out)
}
