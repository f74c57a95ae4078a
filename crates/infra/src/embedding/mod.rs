//! Batch embedding executor.
//!
//! `BatchEmbedder` fans a list of texts out to an [`EmbeddingProvider`] in
//! bounded sub-batches and reports per-item success. It never touches the job
//! or document stores.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

pub mod hashing;
pub mod openai;

pub use hashing::HashingProvider;
pub use openai::OpenAiCompatibleProvider;

/// Default number of texts sent to the provider per request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Provider error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

/// One provider response, aligned with the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderBatch {
    /// `vectors[i]` belongs to `texts[i]`; `None` when the provider rejected that item.
    pub vectors: Vec<Option<Vec<f32>>>,
    pub total_tokens: u64,
}

/// External embedding service.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier persisted alongside each embedding.
    fn model(&self) -> &str;

    /// Embed one request-sized batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<ProviderBatch, ProviderError>;
}

/// Outcome of [`BatchEmbedder::embed_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEmbedding {
    /// Same length and order as the input.
    pub embeddings: Vec<Option<Vec<f32>>>,
    pub total_tokens: u64,
    /// Input positions that produced no embedding.
    pub failed_indices: BTreeSet<usize>,
}

impl BatchEmbedding {
    pub fn succeeded(&self) -> usize {
        self.embeddings.len() - self.failed_indices.len()
    }
}

/// Sends texts to a provider in sub-batches of at most `batch_size`.
pub struct BatchEmbedder<P: ?Sized> {
    provider: Arc<P>,
    batch_size: usize,
}

impl<P: ?Sized> Clone for BatchEmbedder<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            batch_size: self.batch_size,
        }
    }
}

impl<P: EmbeddingProvider + ?Sized> BatchEmbedder<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the sub-batch size (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embed `texts`, preserving order.
    ///
    /// A failing sub-batch marks all of its positions failed instead of
    /// returning an error, so callers always get a result they can zip back
    /// onto their source rows.
    pub async fn embed_batch(&self, texts: &[String]) -> BatchEmbedding {
        let mut result = BatchEmbedding {
            embeddings: Vec::with_capacity(texts.len()),
            ..Default::default()
        };

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            match self.provider.embed(batch).await {
                Ok(response) if response.vectors.len() == batch.len() => {
                    result.total_tokens += response.total_tokens;
                    for (i, vector) in response.vectors.into_iter().enumerate() {
                        match vector {
                            Some(v) if !v.is_empty() => result.embeddings.push(Some(v)),
                            _ => {
                                result.failed_indices.insert(offset + i);
                                result.embeddings.push(None);
                            }
                        }
                    }
                }
                Ok(response) => {
                    warn!(
                        batch = batch_no,
                        expected = batch.len(),
                        received = response.vectors.len(),
                        "provider returned misaligned batch; marking it failed"
                    );
                    result.total_tokens += response.total_tokens;
                    mark_failed(&mut result, offset, batch.len());
                }
                Err(e) => {
                    warn!(batch = batch_no, size = batch.len(), error = %e, "embedding batch failed");
                    mark_failed(&mut result, offset, batch.len());
                }
            }
        }

        debug!(
            total = texts.len(),
            failed = result.failed_indices.len(),
            tokens = result.total_tokens,
            "embedding batch finished"
        );
        result
    }
}

fn mark_failed(result: &mut BatchEmbedding, offset: usize, len: usize) {
    for i in 0..len {
        result.failed_indices.insert(offset + i);
        result.embeddings.push(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails any text containing "reject"; fails whole requests containing "outage".
    #[derive(Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn embed(&self, texts: &[String]) -> Result<ProviderBatch, ProviderError> {
            self.calls.lock().unwrap().push(texts.len());
            if texts.iter().any(|t| t.contains("outage")) {
                return Err(ProviderError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(ProviderBatch {
                vectors: texts
                    .iter()
                    .map(|t| (!t.contains("reject")).then(|| vec![t.len() as f32]))
                    .collect(),
                total_tokens: texts.len() as u64,
            })
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn keeps_input_order_and_reports_item_failures() {
        let embedder = BatchEmbedder::new(Arc::new(ScriptedProvider::default()));
        let out = embedder
            .embed_batch(&texts(&["a", "reject me", "ccc"]))
            .await;

        assert_eq!(out.embeddings.len(), 3);
        assert_eq!(out.embeddings[0], Some(vec![1.0]));
        assert_eq!(out.embeddings[1], None);
        assert_eq!(out.embeddings[2], Some(vec![3.0]));
        assert_eq!(out.failed_indices, BTreeSet::from([1]));
        assert_eq!(out.succeeded(), 2);
    }

    #[tokio::test]
    async fn splits_into_sub_batches() {
        let provider = Arc::new(ScriptedProvider::default());
        let embedder = BatchEmbedder::new(provider.clone()).with_batch_size(2);
        let out = embedder
            .embed_batch(&texts(&["a", "b", "c", "d", "e"]))
            .await;

        assert_eq!(*provider.calls.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(out.total_tokens, 5);
        assert!(out.failed_indices.is_empty());
    }

    #[tokio::test]
    async fn provider_outage_fails_only_that_sub_batch() {
        let embedder =
            BatchEmbedder::new(Arc::new(ScriptedProvider::default())).with_batch_size(2);
        let out = embedder
            .embed_batch(&texts(&["a", "b", "outage", "d", "e"]))
            .await;

        assert_eq!(out.embeddings.len(), 5);
        assert_eq!(out.failed_indices, BTreeSet::from([2, 3]));
        assert!(out.embeddings[4].is_some());
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::default());
        let out = BatchEmbedder::new(provider.clone()).embed_batch(&[]).await;
        assert!(out.embeddings.is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}
