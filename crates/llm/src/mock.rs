//! Scripted mock LLM for orchestration tests

use crate::{LlmApi, LlmMessage};
use async_trait::async_trait;
use rndsearch_core::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Returns queued responses in order, then falls back to a fixed default.
/// Every call is counted so tests can assert which paths hit the LLM.
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    call_count: AtomicUsize,
    fail: bool,
}

impl MockLlm {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            default_response: "{}".to_string(),
            call_count: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn with_default(mut self, default_response: impl Into<String>) -> Self {
        self.default_response = default_response.into();
        self
    }

    /// Every call errors, for failure-path tests
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: String::new(),
            call_count: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmApi for MockLlm {
    async fn chat(
        &self,
        _messages: Vec<LlmMessage>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::llm("mock LLM configured to fail"));
        }
        let mut queue = self
            .responses
            .lock()
            .map_err(|_| Error::llm("mock queue poisoned"))?;
        Ok(queue
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_queued_then_default() {
        let mock = MockLlm::new(vec!["first", "second"]).with_default("fallback");
        assert_eq!(mock.chat(vec![], 10, 0.0).await.unwrap(), "first");
        assert_eq!(mock.chat(vec![], 10, 0.0).await.unwrap(), "second");
        assert_eq!(mock.chat(vec![], 10, 0.0).await.unwrap(), "fallback");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockLlm::failing();
        assert!(mock.chat(vec![], 10, 0.0).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }
}
