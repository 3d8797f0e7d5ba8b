//! Deterministic stand-ins for model calls, used by the unit tests

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::TurnError;
use crate::guardrail::{GuardrailClassifier, Verdict};
use crate::providers::{
    ChatMessage, ChatResponse, ChatResponseBlock, ChatUsage, LlmProvider, StopReason, ToolChoice,
    ToolDefinition,
};

/// One recorded `chat` call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub system: String,
    pub tool_choice: ToolChoice,
}

impl RecordedCall {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Provider that replays queued responses in order and records every request
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ChatResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_call_id: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(ChatResponse {
            blocks: vec![ChatResponseBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage::default(),
        }));
    }

    pub fn push_tool_call(&self, name: &str, input: Value) {
        self.push_tool_calls(&[(name, input)]);
    }

    pub fn push_tool_calls(&self, calls: &[(&str, Value)]) {
        let blocks = calls
            .iter()
            .map(|(name, input)| {
                let mut next = self.next_call_id.lock().unwrap();
                *next += 1;
                ChatResponseBlock::ToolCall {
                    id: format!("call_{}", *next),
                    name: name.to_string(),
                    input: input.clone(),
                }
            })
            .collect();
        self.responses.lock().unwrap().push_back(Ok(ChatResponse {
            blocks,
            stop_reason: StopReason::ToolUse,
            usage: ChatUsage::default(),
        }));
    }

    /// Text cut off at the output token limit
    pub fn push_truncated(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(ChatResponse {
            blocks: vec![ChatResponseBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: StopReason::MaxTokens,
            usage: ChatUsage::default(),
        }));
    }

    pub fn push_empty(&self) {
        self.responses.lock().unwrap().push_back(Ok(ChatResponse {
            blocks: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage::default(),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
        tool_choice: &ToolChoice,
    ) -> Result<ChatResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            system: system.to_string(),
            tool_choice: tool_choice.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response left")))
    }
}

/// Classifier that flags input by substring on the latest user message
pub struct StubClassifier {
    needle: Option<String>,
    malformed: bool,
    seen: Mutex<Vec<usize>>,
}

impl StubClassifier {
    pub fn allow() -> Self {
        Self {
            needle: None,
            malformed: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn flag_containing(needle: &str) -> Self {
        Self {
            needle: Some(needle.to_lowercase()),
            ..Self::allow()
        }
    }

    pub fn malformed() -> Self {
        Self {
            malformed: true,
            ..Self::allow()
        }
    }

    /// Input lengths seen by each classify call
    pub fn seen_input_lengths(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuardrailClassifier for StubClassifier {
    async fn classify(&self, input: &[ChatMessage]) -> Result<Verdict, TurnError> {
        self.seen.lock().unwrap().push(input.len());

        if self.malformed {
            return Err(TurnError::MalformedVerdict {
                raw: "garbage".to_string(),
            });
        }

        let latest = input.last().map(|m| m.text().to_lowercase()).unwrap_or_default();
        let flagged = self
            .needle
            .as_ref()
            .is_some_and(|needle| latest.contains(needle.as_str()));

        Ok(Verdict {
            flagged,
            reasoning: if flagged {
                "Request asks for academic research content".to_string()
            } else {
                "Product question".to_string()
            },
        })
    }
}
