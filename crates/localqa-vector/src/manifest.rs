//! `manifest.json`: written last into a finished index directory.
//!
//! An index directory without a manifest is incomplete and is never opened.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn new(embedder_id: impl Into<String>, dim: usize, chunk_size: usize, chunk_overlap: usize, document_count: usize) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            embedder_id: embedder_id.into(),
            dim,
            chunk_size,
            chunk_overlap,
            document_count,
            chunk_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn read(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let manifest: Self = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(anyhow!(
                "{} has format version {}, expected {}",
                path.display(),
                manifest.format_version,
                FORMAT_VERSION
            ));
        }
        Ok(manifest)
    }

    pub fn write(&self, index_dir: &Path) -> Result<()> {
        let path = index_dir.join(MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?).with_context(|| format!("writing {}", path.display()))
    }
}
