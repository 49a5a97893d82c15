//! OpenAI-compatible LLM chat client
//!
//! One client serves the analyzer, the SQL generator, the keyword reviewer,
//! and the answer generator. The reasoning wrapper parses `<think>` blocks
//! emitted by reasoning-tuned models into a separate field.

pub mod client;
pub mod mock;

pub use client::{LlmClient, LlmMessage, ReasoningResult};
pub use mock::MockLlm;

use async_trait::async_trait;
use rndsearch_core::Result;

/// The LLM contract the workflow depends on; tests substitute [`MockLlm`]
#[async_trait]
pub trait LlmApi: Send + Sync {
    /// Raw multi-message chat; returns the first choice's content
    async fn chat(
        &self,
        messages: Vec<LlmMessage>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;

    /// Single-prompt generation with an optional system prompt
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(LlmMessage::system(system));
        }
        messages.push(LlmMessage::user(prompt));
        self.chat(messages, max_tokens, temperature).await
    }

    /// Generation with a step-by-step reasoning preamble; the `<think>`
    /// block is split off into [`ReasoningResult::thinking`]
    async fn generate_with_reasoning(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<ReasoningResult> {
        let raw = self
            .generate(prompt, Some(system_prompt), max_tokens, 0.6)
            .await?;
        Ok(ReasoningResult::parse(&raw))
    }
}
