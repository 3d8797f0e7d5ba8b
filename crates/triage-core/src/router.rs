//! Triage router: guardrail check, then tool use or handoff to one responder
//!
//! The router drives a bounded tool loop against the provider. The triage agent
//! sees the `estimate_cost` tool plus one synthetic `transfer_to_*` tool per
//! responder:
//!
//! - a successful `estimate_cost` call by the triage agent ends the turn with
//!   the tool's structured result as output;
//! - a `transfer_to_*` call swaps the active agent for that responder, which
//!   then runs its own loop (tool results are fed back to it) until it answers;
//! - a plain text answer ends the turn with the active agent as responder.
//!
//! When the latest user message asks for a cost estimate, every triage call is
//! made with `estimate_cost` required. A text reply to a forced call is dropped
//! and the call re-issued once; a second one fails the turn with
//! [`TurnError::CostEstimateUnavailable`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agents::{AgentDescriptor, AgentId, Responder, triage_descriptor};
use crate::error::TurnError;
use crate::guardrail::{GuardrailGate, Verdict};
use crate::providers::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatRole, ChatUsage, LlmProvider, StopReason,
    ToolChoice,
};
use crate::tools::estimate_cost::ESTIMATE_COST_TOOL;
use crate::tools::{FilteredToolExecutor, ToolExecutor, ToolRegistry};

pub const DEFAULT_MAX_TURNS: usize = 10;

/// Cap on a single tool output fed back into the transcript
const MAX_TOOL_OUTPUT: usize = 100_000;

/// Text replies tolerated from a forced cost call before the turn fails
const MAX_UNFORCED_REPLIES: usize = 1;

/// Configuration for the triage router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Maximum model calls per turn, across triage and responder
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

/// Final output of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnOutput {
    Text(String),
    /// Mapping or sequence, e.g. a tool result returned verbatim
    Structured(Value),
}

impl TurnOutput {
    fn from_tool_output(output: String) -> Self {
        match serde_json::from_str::<Value>(&output) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
            _ => Self::Text(output),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// Outcome of an admitted turn
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// The single agent that produced the output
    pub agent: AgentId,
    pub output: TurnOutput,
    /// Full transcript after this turn; replaces the session history
    pub history: Vec<ChatMessage>,
    pub verdict: Verdict,
    pub usage: ChatUsage,
}

impl TurnResult {
    pub fn agent_name(&self) -> &'static str {
        self.agent.name()
    }
}

enum Step {
    Handoff(Responder),
    Finish(TurnOutput),
}

/// Entry agent that owns the guardrail gate
pub struct TriageRouter {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    gate: GuardrailGate,
    triage: AgentDescriptor,
    config: RouterConfig,
}

impl TriageRouter {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        gate: GuardrailGate,
    ) -> Self {
        Self {
            provider,
            tools,
            gate,
            triage: triage_descriptor(),
            config: RouterConfig::default(),
        }
    }

    /// Set the router configuration
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one turn over `input` (prior history followed by the new user message).
    ///
    /// The guardrail runs first; a tripped gate returns before any triage model
    /// call is made.
    pub async fn run(&self, input: Vec<ChatMessage>) -> Result<TurnResult, TurnError> {
        let verdict = self.gate.check(&input).await?;
        self.route(input, verdict).await
    }

    async fn route(
        &self,
        mut transcript: Vec<ChatMessage>,
        verdict: Verdict,
    ) -> Result<TurnResult, TurnError> {
        let mut agent = self.triage.clone();
        let mut usage = ChatUsage::default();

        // A cost request keeps the triage agent on the estimator until it
        // yields a result; responders reached by handoff are never forced.
        let cost_request = agent.is_tool_allowed(ESTIMATE_COST_TOOL)
            && latest_user_text(&transcript).is_some_and(|text| requests_cost_estimate(&text));
        if cost_request {
            debug!("Cost estimate requested, forcing {}", ESTIMATE_COST_TOOL);
        }
        let mut unforced_replies = 0;

        for iteration in 1..=self.config.max_turns {
            let executor = FilteredToolExecutor::new(self.tools.clone(), &agent.tools);
            let mut tool_defs = executor.list_tools();
            tool_defs.extend(agent.handoff_tools());

            let forced = cost_request && agent.id == AgentId::Triage;
            let tool_choice = if forced {
                ToolChoice::Required(ESTIMATE_COST_TOOL.to_string())
            } else {
                ToolChoice::Auto
            };

            info!("{} loop iteration {}", agent.name, iteration);

            let response = self
                .provider
                .chat(&transcript, &tool_defs, &agent.system_prompt(), &tool_choice)
                .await?;

            usage.input_tokens += response.usage.input_tokens;
            usage.output_tokens += response.usage.output_tokens;

            let calls: Vec<(String, String, Value)> = response
                .tool_calls()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if calls.is_empty() && forced {
                // The reply is dropped: a cost answer must come from the tool
                unforced_replies += 1;
                if unforced_replies > MAX_UNFORCED_REPLIES {
                    warn!("{} kept answering without {}", agent.name, ESTIMATE_COST_TOOL);
                    return Err(TurnError::CostEstimateUnavailable {
                        tool: ESTIMATE_COST_TOOL,
                    });
                }
                warn!(
                    "{} ignored the forced {} call, re-issuing",
                    agent.name, ESTIMATE_COST_TOOL
                );
                continue;
            }

            transcript.push(response.to_message());

            if calls.is_empty() {
                if response.stop_reason == StopReason::MaxTokens {
                    warn!("{} output cut off at the token limit", agent.name);
                    return Err(TurnError::OutputTruncated { agent: agent.id });
                }
                let text = response.text();
                if text.trim().is_empty() {
                    return Err(TurnError::EmptyResponse { agent: agent.id });
                }
                info!("{} answered ({} chars)", agent.name, text.len());
                return Ok(TurnResult {
                    agent: agent.id,
                    output: TurnOutput::Text(text),
                    history: transcript,
                    verdict,
                    usage,
                });
            }

            let mut results = Vec::with_capacity(calls.len());
            let mut next: Option<Step> = None;

            for (id, name, input) in calls {
                if next.is_some() {
                    debug!("Skipping tool call {} after turn was resolved", name);
                    results.push(tool_result(id, "Skipped: this turn was already resolved."));
                    continue;
                }

                if let Some(target) = agent.handoff_target(&name) {
                    info!("{} handing off to {}", agent.name, target);
                    let payload = serde_json::json!({ "assistant": target.name() });
                    results.push(tool_result(id, payload.to_string()));
                    next = Some(Step::Handoff(target));
                    continue;
                }

                match executor.execute(&name, input).await {
                    Ok(mut output) => {
                        if output.len() > MAX_TOOL_OUTPUT {
                            let mut cut = MAX_TOOL_OUTPUT;
                            while !output.is_char_boundary(cut) {
                                cut -= 1;
                            }
                            output.truncate(cut);
                            output.push_str("\n[Output truncated]");
                        }
                        if agent.id == AgentId::Triage {
                            next = Some(Step::Finish(TurnOutput::from_tool_output(output.clone())));
                        }
                        results.push(tool_result(id, output));
                    }
                    Err(e) => {
                        warn!("Tool {} failed for {}: {}", name, agent.name, e);
                        results.push(tool_result(id, format!("Error: {}", e)));
                    }
                }
            }

            transcript.push(ChatMessage {
                role: ChatRole::User,
                content: ChatMessageContent::Blocks(results),
            });

            match next {
                Some(Step::Handoff(target)) => agent = target.descriptor(),
                Some(Step::Finish(output)) => {
                    info!("{} answered with a tool result", agent.name);
                    return Ok(TurnResult {
                        agent: agent.id,
                        output,
                        history: transcript,
                        verdict,
                        usage,
                    });
                }
                None => {}
            }
        }

        warn!("Agent loop exceeded {} model calls", self.config.max_turns);
        Err(TurnError::MaxTurnsExceeded(self.config.max_turns))
    }
}

fn tool_result(tool_call_id: String, content: impl Into<String>) -> ChatBlock {
    ChatBlock::ToolResult {
        tool_call_id,
        content: content.into(),
    }
}

fn latest_user_text(transcript: &[ChatMessage]) -> Option<String> {
    transcript
        .iter()
        .rev()
        .filter(|m| m.role == ChatRole::User)
        .map(ChatMessage::text)
        .find(|text| !text.trim().is_empty())
}

const COST_SIGNALS: [&str; 6] = ["cost", "estimate", "price", "budget", "how much", "total for"];

/// Words that tie a count to a per-unit price
const UNIT_MARKERS: [&str; 8] = ["unit", "units", "each", "per", "at", "x", "×", "items"];

/// Heuristic: does this message ask for a numeric cost estimate?
///
/// Needs a cost word plus a count-and-unit-price shape: at least two numbers
/// and a unit marker ("100 units at 5 each", "250x 4.20", "3 × 7.5"). A lone
/// year or count next to "budget" or "price" is left to the model.
pub fn requests_cost_estimate(text: &str) -> bool {
    let lower = text.to_lowercase().replace('×', " × ");
    if !COST_SIGNALS.iter().any(|s| lower.contains(s)) {
        return false;
    }

    let mut numbers = 0;
    let mut has_marker = false;
    for token in lower.split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | ',' | '×'))) {
        let token = token.trim_matches(|c| c == '.' || c == ',');
        if token.is_empty() {
            continue;
        }
        if is_number(token) {
            numbers += 1;
        } else if let Some(count) = token.strip_suffix('x')
            && is_number(count)
        {
            numbers += 1;
            has_marker = true;
        } else if UNIT_MARKERS.contains(&token) {
            has_marker = true;
        }
    }

    numbers >= 2 && has_marker
}

fn is_number(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
}
