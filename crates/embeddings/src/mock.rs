//! Deterministic mock embedding provider for tests

use crate::EmbeddingApi;
use async_trait::async_trait;
use rndsearch_core::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Produces a deterministic vector derived from the text bytes, so equal
/// inputs embed identically without any remote service.
pub struct MockEmbeddingProvider {
    dimension: usize,
    call_count: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EmbeddingApi for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let seed: u32 = text.bytes().fold(0u32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u32)
        });
        Ok((0..self.dimension)
            .map(|i| {
                let v = seed.wrapping_add(i as u32).wrapping_mul(2654435761) >> 16;
                (v % 1000) as f32 / 1000.0
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let provider = MockEmbeddingProvider::new(8);
        let a = provider.embed("수소연료전지").await.unwrap();
        let b = provider.embed("수소연료전지").await.unwrap();
        let c = provider.embed("인공지능").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
        assert_eq!(provider.call_count(), 3);
    }
}
