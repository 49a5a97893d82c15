//! Remote embedding API client
//!
//! The embedding service takes raw text and returns a fixed-dimension dense
//! vector. Queries and payload text go through the same endpoint.

pub mod api;
pub mod mock;

pub use api::ApiEmbeddingProvider;
pub use mock::MockEmbeddingProvider;

use async_trait::async_trait;
use rndsearch_core::Result;

/// The embedding contract; tests substitute [`MockEmbeddingProvider`]
#[async_trait]
pub trait EmbeddingApi: Send + Sync {
    /// Embed one text into a fixed-dimension vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Expected vector dimension
    fn dimension(&self) -> usize;
}
