//! OpenAI-compatible embeddings client (OpenAI, OpenRouter, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{EmbeddingProvider, ProviderBatch, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/text-embedding-3-small";

/// Async embeddings client for `POST {base_url}/embeddings`.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    model: String,
    max_attempts: usize,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config("missing embedding API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(ProviderError::Config("missing embedding model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ProviderError::Config("invalid embedding API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            max_attempts: 3,
        })
    }

    /// Attempts per request for 429/5xx/transport failures (minimum 1).
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(250 * (1 << capped))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderBatch, ProviderError> {
        if texts.is_empty() {
            return Ok(ProviderBatch::default());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => resp,
                Err(err) if (err.is_timeout() || err.is_connect()) && attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "embedding request failed; retrying");
                    tokio::time::sleep(Self::retry_backoff(attempt)).await;
                    continue;
                }
                Err(err) => return Err(ProviderError::Transport(err.to_string())),
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Decode(e.to_string()))?;
                return Ok(parsed.into_batch(texts.len()));
            }

            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            if Self::should_retry(status) && attempt < self.max_attempts {
                warn!(attempt, status = status.as_u16(), "embedding provider busy; retrying");
                tokio::time::sleep(Self::retry_backoff(attempt)).await;
                continue;
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl EmbeddingResponse {
    /// Place each entry at its `index`; positions the provider skipped stay `None`.
    fn into_batch(self, expected: usize) -> ProviderBatch {
        let mut vectors = vec![None; expected];
        for entry in self.data {
            if let Some(slot) = vectors.get_mut(entry.index) {
                *slot = Some(entry.embedding);
            }
        }
        ProviderBatch {
            vectors,
            total_tokens: self.usage.map(|u| u.total_tokens).unwrap_or(0),
        }
    }
}
