//! LLM client for the text-generation capability
//!
//! Rule synthesis and profile fusion only need "prompt in, text out", which
//! is the [`TextGenerator`] trait. [`OpenRouterClient`] implements it against
//! any OpenAI-compatible chat-completions endpoint.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model for analysis prompts
pub const DEFAULT_ANALYSIS_MODEL: &str = "google/gemini-2.0-flash-001";

/// Prompt-in, text-out capability consumed by the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a single natural-language prompt and return the reply text
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============ Provider Configuration ============

/// Configuration for an LLM API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Extra headers to include in requests (e.g., X-Title, HTTP-Referer)
    pub extra_headers: Vec<(String, String)>,
    /// Whether to include `transforms: []` in requests (OpenRouter-specific)
    pub include_transforms: bool,
}

impl ProviderConfig {
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![
                ("HTTP-Referer".to_string(), "https://github.com/music2myears".to_string()),
                ("X-Title".to_string(), "Music2MyEars".to_string()),
            ],
            include_transforms: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transforms: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }
}

/// Chat-completions client bound to one model
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Arc<Client>,
    provider: ProviderConfig,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self::with_provider(ProviderConfig::openrouter(api_key), model)
    }

    pub fn with_provider(provider: ProviderConfig, model: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            provider,
            model: model.into(),
            max_tokens: Some(2048),
        }
    }

    /// Create a client using the stored OpenRouter key
    pub fn from_keyring(model: impl Into<String>) -> Result<Self> {
        let api_key = crate::secrets::get_api_key()?;
        Ok(Self::new(api_key, model))
    }

    /// Send a chat completion request
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            transforms: if self.provider.include_transforms { Some(vec![]) } else { None },
        };

        let mut req_builder = self.client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, body);
        }

        let body = response.text().await.context("Failed to read response body")?;
        let raw_response: serde_json::Value = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse JSON response (body: {})", truncate(&body, 500)))?;

        let content = content_text(&raw_response);
        debug!("LLM replied with {} chars", content.len());
        Ok(content)
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenRouterClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system("You are a precise music-analysis assistant. Follow output formats exactly."),
            ChatMessage::user(prompt),
        ];
        self.complete(messages).await
    }
}

/// Pull the assistant text out of a chat-completions response
///
/// Handles both string content and array-of-content-parts formats.
fn content_text(response: &serde_json::Value) -> String {
    let content_value = response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));

    match content_value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                    part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("valid regex")
});

/// Locate the JSON object inside a model reply
///
/// Models often wrap JSON in a code fence or add a sentence around it.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        let user_msg = ChatMessage::user("Hello");
        assert_eq!(user_msg.role, "user");
        assert_eq!(ChatMessage::system("x").role, "system");
    }

    #[test]
    fn test_content_text_string() {
        let response = serde_json::json!({"choices": [{"message": {"content": "Hello world"}}]});
        assert_eq!(content_text(&response), "Hello world");
    }

    #[test]
    fn test_content_text_array() {
        let response = serde_json::json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hello "},
            {"type": "text", "text": "world"}
        ]}}]});
        assert_eq!(content_text(&response), "Hello world");
    }

    #[test]
    fn test_content_text_missing() {
        assert_eq!(content_text(&serde_json::json!({"choices": []})), "");
    }

    #[test]
    fn test_extract_json_from_fence() {
        let reply = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_object(reply), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_bare() {
        assert_eq!(extract_json_object("sure {\"a\": {\"b\": 2}} ok"), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(extract_json_object("no json here"), None);
    }
}
