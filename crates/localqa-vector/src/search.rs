use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray, UInt64Array};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;
use tracing::{debug, info};

use localqa_core::traits::VectorSearch;
use localqa_core::types::{DocumentChunk, ScoredChunk};

use crate::manifest::{IndexManifest, MANIFEST_FILE};
use crate::schema::CHUNKS_TABLE;
use crate::table::{column, open_db, table_exists};

/// A persisted index opened for reading.
pub struct VectorIndex {
	table: Table,
	manifest: IndexManifest,
}

impl VectorIndex {
	/// Open the index at `index_dir`.
	///
	/// Returns `Ok(None)` when nothing has been ingested there yet (no
	/// directory or no manifest). A directory that has a manifest but cannot
	/// be opened is an error.
	pub async fn open(index_dir: &Path) -> Result<Option<Self>> {
		if !index_dir.join(MANIFEST_FILE).is_file() {
			debug!("No manifest under {}", index_dir.display());
			return Ok(None);
		}
		let manifest = IndexManifest::read(index_dir)?;
		let db = open_db(index_dir).await?;
		if !table_exists(&db, CHUNKS_TABLE).await? {
			return Err(anyhow!("index at {} has no '{}' table", index_dir.display(), CHUNKS_TABLE));
		}
		let table = db.open_table(CHUNKS_TABLE).execute().await?;
		let rows = table.count_rows(None).await?;
		if rows != manifest.chunk_count {
			return Err(anyhow!(
				"index at {} holds {} rows but its manifest lists {}",
				index_dir.display(),
				rows,
				manifest.chunk_count
			));
		}
		info!("Opened index at {} ({} chunks, embedder {})", index_dir.display(), rows, manifest.embedder_id);
		Ok(Some(Self { table, manifest }))
	}

	pub fn manifest(&self) -> &IndexManifest { &self.manifest }

	/// Top-`k` chunks by cosine similarity, best first. Ties are broken by chunk id.
	pub async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
		if k == 0 || self.manifest.chunk_count == 0 {
			return Ok(Vec::new());
		}
		if query_vec.len() != self.manifest.dim {
			return Err(anyhow!("query vector has dim {} but the index uses {}", query_vec.len(), self.manifest.dim));
		}
		let mut stream = self
			.table
			.vector_search(query_vec.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let distances = column::<Float32Array>(&batch, "_distance")?;
			let chunks = chunks_from_batch(&batch)?;
			for (i, chunk) in chunks.into_iter().enumerate() {
				hits.push(ScoredChunk { chunk, score: 1.0 - distances.value(i) });
			}
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk.id.cmp(&b.chunk.id)));
		hits.truncate(k);
		Ok(hits)
	}

	/// Every stored chunk with its vector, ordered by document then position.
	pub async fn chunks(&self) -> Result<Vec<(DocumentChunk, Vec<f32>)>> {
		let mut stream = self.table.query().execute().await?;
		let mut out = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let vectors = column::<FixedSizeListArray>(&batch, "vector")?;
			for (i, chunk) in chunks_from_batch(&batch)?.into_iter().enumerate() {
				let values = vectors.value(i);
				let values = values.as_primitive::<arrow_array::types::Float32Type>();
				out.push((chunk, values.values().to_vec()));
			}
		}
		out.sort_by(|(a, _), (b, _)| a.doc_id.cmp(&b.doc_id).then(a.chunk_index.cmp(&b.chunk_index)));
		Ok(out)
	}
}

fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<DocumentChunk>> {
	let ids = column::<StringArray>(batch, "id")?;
	let doc_ids = column::<StringArray>(batch, "doc_id")?;
	let doc_paths = column::<StringArray>(batch, "doc_path")?;
	let contents = column::<StringArray>(batch, "content")?;
	let chunk_indices = column::<Int32Array>(batch, "chunk_index")?;
	let total_chunks = column::<Int32Array>(batch, "total_chunks")?;
	let starts = column::<UInt64Array>(batch, "start")?;
	let ends = column::<UInt64Array>(batch, "end")?;
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		out.push(DocumentChunk {
			id: ids.value(i).to_string(),
			doc_id: doc_ids.value(i).to_string(),
			doc_path: doc_paths.value(i).to_string(),
			content: contents.value(i).to_string(),
			chunk_index: usize::try_from(chunk_indices.value(i))?,
			total_chunks: usize::try_from(total_chunks.value(i))?,
			start: usize::try_from(starts.value(i))?,
			end: usize::try_from(ends.value(i))?,
		});
	}
	Ok(out)
}

#[async_trait]
impl VectorSearch for VectorIndex {
	fn len(&self) -> usize { self.manifest.chunk_count }

	async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
		self.search(query_vec, k).await
	}
}
