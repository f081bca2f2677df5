use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use localqa_core::traits::Embedder;

/// Deterministic bag-of-words embedder.
///
/// Each lower-cased alphanumeric token is hashed into one of `dim` buckets, so
/// texts sharing words get a high cosine similarity. No model files needed.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("fake:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty());
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        } else {
            // Texts without tokens still need a unit vector.
            v[0] = 1.0;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

    #[test]
    fn shared_words_score_higher_than_unrelated_text() {
        let e = FakeEmbedder::new(384);
        let q = e.embed_query("What is the capital of France?").unwrap();
        let hit = e.embed_batch(&["The capital of France is Paris.".to_string()]).unwrap().remove(0);
        let miss = e.embed_batch(&["Bananas are yellow".to_string()]).unwrap().remove(0);
        assert!(cosine(&q, &hit) > cosine(&q, &miss));
    }

    #[test]
    fn empty_text_is_still_unit_length() {
        let v = FakeEmbedder::new(8).embed_batch(&["  ...  ".to_string()]).unwrap().remove(0);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
