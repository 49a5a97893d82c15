use crate::LlmApi;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use rndsearch_core::config::LlmConfig;
use rndsearch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One chat message in OpenAI wire shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Output of a reasoning-mode generation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReasoningResult {
    pub thinking: Option<String>,
    pub answer: String,
}

impl ReasoningResult {
    /// Split a `<think>...</think>` block off the front of the response.
    /// Responses without the block pass through unchanged.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some(start) = trimmed.find("<think>") {
            if let Some(end) = trimmed.find("</think>") {
                if end > start {
                    let thinking = trimmed[start + "<think>".len()..end].trim().to_string();
                    let answer = trimmed[end + "</think>".len()..].trim().to_string();
                    return Self {
                        thinking: (!thinking.is_empty()).then_some(thinking),
                        answer,
                    };
                }
            }
            // opening tag without a close: treat everything after it as answer
            warn!("unterminated <think> block in LLM response");
        }
        Self {
            thinking: None,
            answer: trimmed.to_string(),
        }
    }
}

/// OpenAI-compatible chat client
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        info!("Initializing LLM client");
        info!("  Base URL: {}", config.base_url);
        info!("  Model: {}", config.model);
        info!("  Timeout: {}s", config.timeout_secs);

        let mut openai_config = OpenAIConfig::new().with_api_base(&config.base_url);
        if let Some(ref api_key) = config.api_key {
            openai_config = openai_config.with_api_key(api_key);
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::llm(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.model.clone(),
        })
    }

    /// Non-blocking health probe against /v1/models
    pub async fn check_health(&self) -> bool {
        match self.client.models().list().await {
            Ok(models) => {
                debug!("LLM health check passed ({} models)", models.data.len());
                true
            }
            Err(e) => {
                warn!("LLM health check failed: {e}");
                false
            }
        }
    }

    fn to_request_messages(
        messages: Vec<LlmMessage>,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            let converted = match message.role.as_str() {
                "system" => ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content)
                    .build()
                    .map_err(|e| Error::llm(format!("Bad system message: {e}")))?
                    .into(),
                "assistant" => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content)
                    .build()
                    .map_err(|e| Error::llm(format!("Bad assistant message: {e}")))?
                    .into(),
                _ => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content)
                    .build()
                    .map_err(|e| Error::llm(format!("Bad user message: {e}")))?
                    .into(),
            };
            out.push(converted);
        }
        Ok(out)
    }
}

#[async_trait]
impl LlmApi for LlmClient {
    async fn chat(
        &self,
        messages: Vec<LlmMessage>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::to_request_messages(messages)?)
            .max_tokens(max_tokens)
            .temperature(temperature)
            .build()
            .map_err(|e| Error::llm(format!("Failed to build chat request: {e}")))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| Error::llm(format!("Chat completion failed: {e}")))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        debug!("LLM response: {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_parse_with_think_block() {
        let raw = "<think>\n1단계: 의도 파악\n2단계: 분류\n</think>\n{\"query_type\": \"sql\"}";
        let result = ReasoningResult::parse(raw);
        assert_eq!(result.thinking.as_deref(), Some("1단계: 의도 파악\n2단계: 분류"));
        assert_eq!(result.answer, "{\"query_type\": \"sql\"}");
    }

    #[test]
    fn test_reasoning_parse_without_block() {
        let result = ReasoningResult::parse("plain answer");
        assert!(result.thinking.is_none());
        assert_eq!(result.answer, "plain answer");
    }

    #[test]
    fn test_reasoning_parse_unterminated_block() {
        let result = ReasoningResult::parse("<think>never closed");
        assert!(result.thinking.is_none());
        assert_eq!(result.answer, "<think>never closed");
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(LlmMessage::system("s").role, "system");
        assert_eq!(LlmMessage::user("u").role, "user");
        assert_eq!(LlmMessage::assistant("a").role, "assistant");
    }
}
