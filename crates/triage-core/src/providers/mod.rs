//! LLM provider abstraction layer
//!
//! Every model call in the crate (guardrail classification, triage, responders)
//! goes through the [`LlmProvider`] trait so the wire client can be swapped for
//! a scripted stub in tests.

pub mod openai;
pub mod openai_compat;
pub mod types;

pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason, ToolChoice, ToolDefinition,
};
