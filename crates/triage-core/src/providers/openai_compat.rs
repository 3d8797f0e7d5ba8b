//! OpenAI-compatible provider for Gemini, Ollama, Groq, LM Studio, etc.
//!
//! Reuses the OpenAI wire format with a configurable base URL.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::openai::OpenAiProvider;
use super::types::{ChatMessage, ChatResponse, LlmProvider, ToolChoice, ToolDefinition};

/// Gemini's OpenAI-compatible endpoint root
pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Default Gemini model for the compatibility endpoint
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// OpenAI-compatible provider wrapping [`OpenAiProvider`] with a custom name
pub struct OpenAiCompatProvider {
    inner: OpenAiProvider,
    name: String,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("inner", &self.inner)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// - `name`: human-readable label (e.g. "gemini", "ollama", "groq")
    /// - `base_url`: the versioned endpoint root (e.g. `http://localhost:11434/v1`)
    pub fn new(
        name: String,
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            inner: OpenAiProvider::new(api_key, model, base_url, max_tokens, request_timeout)?,
            name,
        })
    }

    /// Gemini through its OpenAI-compatible endpoint with default model
    pub fn gemini(api_key: String, max_tokens: u32, request_timeout: Duration) -> Result<Self> {
        Self::new(
            "gemini".to_string(),
            api_key,
            GEMINI_DEFAULT_MODEL.to_string(),
            GEMINI_OPENAI_BASE_URL.to_string(),
            max_tokens,
            request_timeout,
        )
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        tool_choice: &ToolChoice,
    ) -> Result<ChatResponse> {
        self.inner.chat(messages, tools, system, tool_choice).await
    }
}
