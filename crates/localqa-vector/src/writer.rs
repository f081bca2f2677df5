use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use localqa_core::types::DocumentChunk;
use localqa_core::Error;

use crate::manifest::IndexManifest;
use crate::schema::{build_arrow_schema, CHUNKS_TABLE};
use crate::table::open_db;

const BATCH_ROWS: usize = 1000;

/// Full-rebuild writer for the on-disk index.
///
/// Everything is written into `<index>.staging` first; the manifest goes in
/// last and only then is the staging directory swapped into place, so a
/// crashed run never leaves a directory that opens as a valid index.
pub struct IndexWriter {
	index_dir: PathBuf,
}

impl IndexWriter {
	pub fn new(index_dir: impl Into<PathBuf>) -> Self {
		Self { index_dir: index_dir.into() }
	}

	pub fn index_dir(&self) -> &Path { &self.index_dir }

	pub async fn write(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>], mut manifest: IndexManifest) -> Result<IndexManifest> {
		if chunks.len() != embeddings.len() {
			return Err(Error::Operation(format!("{} chunks but {} embeddings", chunks.len(), embeddings.len())).into());
		}
		if let Some((i, v)) = embeddings.iter().enumerate().find(|(_, v)| v.len() != manifest.dim) {
			return Err(Error::Operation(format!("embedding {} has dim {}, expected {}", i, v.len(), manifest.dim)).into());
		}
		manifest.chunk_count = chunks.len();

		let staging = sibling(&self.index_dir, "staging")?;
		if let Err(e) = self.build_staging(&staging, chunks, embeddings, &manifest).await {
			let _ = fs::remove_dir_all(&staging);
			return Err(Error::index_write(&self.index_dir, format!("{e:#}")).into());
		}
		swap_into_place(&self.index_dir, &staging).map_err(|e| Error::index_write(&self.index_dir, format!("{e:#}")))?;
		info!("Index with {} chunks written to {}", manifest.chunk_count, self.index_dir.display());
		Ok(manifest)
	}

	async fn build_staging(&self, staging: &Path, chunks: &[DocumentChunk], embeddings: &[Vec<f32>], manifest: &IndexManifest) -> Result<()> {
		if staging.exists() {
			warn!("Removing leftover staging directory {}", staging.display());
			fs::remove_dir_all(staging)?;
		}
		fs::create_dir_all(staging)?;

		let dim = i32::try_from(manifest.dim).map_err(|_| anyhow!("dimension {} too large", manifest.dim))?;
		let schema = build_arrow_schema(dim);
		let mut batches = Vec::new();
		for (rows, vectors) in chunks.chunks(BATCH_ROWS).zip(embeddings.chunks(BATCH_ROWS)) {
			batches.push(chunks_to_record_batch(rows, vectors, dim)?);
		}
		debug!("Writing {} record batches into {}", batches.len(), staging.display());
		{
			let db = open_db(staging).await?;
			if batches.is_empty() {
				db.create_empty_table(CHUNKS_TABLE, schema).execute().await?;
			} else {
				let reader = Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema));
				db.create_table(CHUNKS_TABLE, reader).execute().await?;
			}
		}
		manifest.write(staging)
	}
}

/// Replace `index_dir` with `staging`, keeping the previous index as a
/// `.old` sibling until the new one is in place.
fn swap_into_place(index_dir: &Path, staging: &Path) -> Result<()> {
	if let Some(parent) = index_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent)?;
	}
	if !index_dir.exists() {
		fs::rename(staging, index_dir)?;
		return Ok(());
	}
	let backup = sibling(index_dir, "old")?;
	if backup.exists() {
		fs::remove_dir_all(&backup)?;
	}
	fs::rename(index_dir, &backup)?;
	if let Err(e) = fs::rename(staging, index_dir) {
		// Put the previous index back so readers still find something valid.
		if let Err(restore) = fs::rename(&backup, index_dir) {
			error!(
				"Could not restore previous index from {} to {}: {}",
				backup.display(),
				index_dir.display(),
				restore
			);
		}
		return Err(e.into());
	}
	// The new index is live from here on.
	if let Err(e) = fs::remove_dir_all(&backup) {
		warn!("Previous index left behind at {}: {}", backup.display(), e);
	}
	Ok(())
}

fn sibling(index_dir: &Path, suffix: &str) -> Result<PathBuf> {
	let name = index_dir
		.file_name()
		.ok_or_else(|| Error::InvalidConfig(format!("index path {} has no directory name", index_dir.display())))?;
	Ok(index_dir.with_file_name(format!("{}.{}", name.to_string_lossy(), suffix)))
}

fn content_hash(s: &str) -> String {
	blake3::hash(s.as_bytes()).to_hex().to_string()
}

fn chunks_to_record_batch(chunks: &[DocumentChunk], vectors: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let schema = build_arrow_schema(dim);
	let mut ids = Vec::new(); let mut doc_ids = Vec::new(); let mut doc_paths = Vec::new(); let mut contents = Vec::new(); let mut hashes = Vec::new();
	let mut chunk_indices = Vec::new(); let mut total_chunks = Vec::new(); let mut starts = Vec::new(); let mut ends = Vec::new();
	for c in chunks {
		ids.push(c.id.clone()); doc_ids.push(c.doc_id.clone()); doc_paths.push(c.doc_path.clone()); contents.push(c.content.clone()); hashes.push(content_hash(&c.content));
		chunk_indices.push(i32::try_from(c.chunk_index)?); total_chunks.push(i32::try_from(c.total_chunks)?); starts.push(c.start as u64); ends.push(c.end as u64);
	}
	let vectors = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	let record_batch = RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(doc_ids)),
		Arc::new(StringArray::from(doc_paths)),
		Arc::new(StringArray::from(contents)),
		Arc::new(StringArray::from(hashes)),
		Arc::new(Int32Array::from(chunk_indices)),
		Arc::new(Int32Array::from(total_chunks)),
		Arc::new(UInt64Array::from(starts)),
		Arc::new(UInt64Array::from(ends)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
	])?;
	Ok(record_batch)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_marker(dir: &Path, text: &str) {
		fs::create_dir_all(dir).unwrap();
		fs::write(dir.join("marker"), text).unwrap();
	}

	#[test]
	fn swap_moves_staging_into_a_fresh_location() {
		let tmp = tempfile::tempdir().unwrap();
		let index = tmp.path().join("nested").join("vectorstore");
		let staging = tmp.path().join("vectorstore.staging");
		write_marker(&staging, "new");

		swap_into_place(&index, &staging).unwrap();
		assert_eq!(fs::read_to_string(index.join("marker")).unwrap(), "new");
		assert!(!staging.exists());
	}

	#[test]
	fn swap_replaces_previous_index_and_drops_backup() {
		let tmp = tempfile::tempdir().unwrap();
		let index = tmp.path().join("vectorstore");
		let staging = tmp.path().join("vectorstore.staging");
		let backup = tmp.path().join("vectorstore.old");
		write_marker(&index, "old");
		write_marker(&backup, "stale");
		write_marker(&staging, "new");

		swap_into_place(&index, &staging).unwrap();
		assert_eq!(fs::read_to_string(index.join("marker")).unwrap(), "new");
		assert!(!staging.exists());
		assert!(!backup.exists());
	}

	#[test]
	fn failed_swap_restores_previous_index() {
		let tmp = tempfile::tempdir().unwrap();
		let index = tmp.path().join("vectorstore");
		write_marker(&index, "old");

		let err = swap_into_place(&index, &tmp.path().join("missing.staging"));
		assert!(err.is_err());
		assert_eq!(fs::read_to_string(index.join("marker")).unwrap(), "old");
		assert!(!tmp.path().join("vectorstore.old").exists());
	}

	#[test]
	fn content_hash_is_blake3_hex() {
		let h = content_hash("The capital of France is Paris.");
		assert_eq!(h.len(), 64);
		assert_eq!(h, content_hash("The capital of France is Paris."));
		assert_ne!(h, content_hash("The capital of France is Lyon."));
	}
}
