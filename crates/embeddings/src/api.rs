use crate::EmbeddingApi;
use async_trait::async_trait;
use rndsearch_core::config::EmbeddingsConfig;
use rndsearch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// HTTP embedding provider with bounded request concurrency
pub struct ApiEmbeddingProvider {
    client: reqwest::Client,
    api_url: String,
    dimension: usize,
    concurrency_limiter: Arc<Semaphore>,
}

impl ApiEmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        info!("Initializing embedding API provider");
        info!("  URL: {}", config.api_url);
        info!("  Dimensions: {}", config.dimension);
        info!("  Max concurrent requests: {}", config.max_concurrent_requests);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            dimension: config.dimension,
            concurrency_limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
        })
    }
}

#[async_trait]
impl EmbeddingApi for ApiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::embedding("cannot embed empty text"));
        }

        let _permit = self
            .concurrency_limiter
            .acquire()
            .await
            .map_err(|e| Error::embedding(format!("Semaphore closed: {e}")))?;

        let response = self
            .client
            .post(&self.api_url)
            .json(&EmbeddingRequest { text })
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Embedding request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::embedding(format!("Embedding API error: {e}")))?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Bad embedding response: {e}")))?;

        if parsed.embedding.len() != self.dimension {
            return Err(Error::embedding(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                parsed.embedding.len()
            )));
        }

        debug!("embedded {} chars into {}-dim vector", text.len(), self.dimension);
        Ok(parsed.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
