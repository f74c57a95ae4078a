//! Offline provider for local development.
//!
//! Produces deterministic, L2-normalized bag-of-words vectors so the queue can
//! run end to end without network access. Retrieval quality is not a goal.

use async_trait::async_trait;

use super::{EmbeddingProvider, ProviderBatch, ProviderError};

#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimensions: usize,
    model: String,
}

impl HashingProvider {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("local/hashing-{dimensions}"),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let h = fnv1a(token.to_lowercase().as_bytes());
            v[(h % self.dimensions as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderBatch, ProviderError> {
        Ok(ProviderBatch {
            // Blank texts have nothing to embed and come back as failures.
            vectors: texts
                .iter()
                .map(|t| (!t.trim().is_empty()).then(|| self.vectorize(t)))
                .collect(),
            total_tokens: texts.iter().map(|t| t.split_whitespace().count() as u64).sum(),
        })
    }
}
