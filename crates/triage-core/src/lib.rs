//! triage-core - Routing and guardrail core of the product triage agent
//!
//! This crate provides:
//! - An input guardrail that vetoes academic-research requests before routing
//! - A triage router that answers cost questions with the `estimate_cost` tool
//!   or hands the turn off to one of three specialist responders
//! - Session state that carries conversation history between turns
//! - An OpenAI-compatible provider (Gemini by default) behind the `LlmProvider` trait

pub mod agents;
pub mod error;
pub mod guardrail;
pub mod providers;
pub mod router;
pub mod session;
pub mod tools;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use agents::{AgentDescriptor, AgentId, Responder};
pub use error::{REFUSAL_MESSAGE, TurnError};
pub use guardrail::{
    GateState, GuardrailClassifier, GuardrailGate, LlmClassifier, MalformedVerdictPolicy, Verdict,
};
pub use providers::{ChatMessage, ChatRole, LlmProvider, OpenAiCompatProvider};
pub use router::{RouterConfig, TriageRouter, TurnOutput, TurnResult};
pub use session::{Session, TurnReply};
pub use tools::{ToolExecutor, ToolHandler, ToolRegistry};

