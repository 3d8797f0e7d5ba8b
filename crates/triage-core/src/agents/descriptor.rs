//! An agent's identity, instructions, tools and handoff targets

use serde::{Deserialize, Serialize};

use super::responder::Responder;
use crate::providers::ToolDefinition;
use crate::tools::estimate_cost::ESTIMATE_COST_TOOL;

pub const TRIAGE_AGENT_NAME: &str = "Triage Agent";

/// Prefix prepended to the instructions of any agent that can hand off
const HANDOFF_PROMPT_PREFIX: &str = "You are part of a multi-agent system. Agents can hand off \
    a conversation to a specialist agent by calling a transfer_to_<agent> function. Handoffs \
    happen in the background; do not mention or draw attention to them in your reply.";

const TRIAGE_INSTRUCTIONS: &str = "You determine which agent to use based on the user's product \
    question. If the user asks about estimating costs, you MUST call the 'estimate_cost' tool. \
    Do not answer cost questions yourself.";

/// Which agent a descriptor (or a turn result) refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Triage,
    Responder(Responder),
}

impl AgentId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Triage => TRIAGE_AGENT_NAME,
            Self::Responder(r) => r.name(),
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Static configuration of one agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: String,
    /// Shown to a routing agent to decide whether to hand off here
    pub handoff_description: String,
    pub instructions: String,
    pub handoffs: Vec<Responder>,
    pub tools: Vec<String>,
}

impl AgentDescriptor {
    /// Check if a tool is callable by this agent
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t == tool_name)
    }

    /// System prompt sent with every model call for this agent
    pub fn system_prompt(&self) -> String {
        if self.handoffs.is_empty() {
            self.instructions.clone()
        } else {
            format!("{}\n\n{}", HANDOFF_PROMPT_PREFIX, self.instructions)
        }
    }

    /// Synthetic tool definitions, one per handoff target
    pub fn handoff_tools(&self) -> Vec<ToolDefinition> {
        self.handoffs
            .iter()
            .map(|r| ToolDefinition {
                name: r.handoff_tool_name(),
                description: format!(
                    "Handoff to the {} agent to handle the request. {}",
                    r.name(),
                    r.handoff_description()
                ),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "required": [],
                }),
            })
            .collect()
    }

    /// Resolve a tool name to one of this agent's handoff targets
    pub fn handoff_target(&self, tool_name: &str) -> Option<Responder> {
        self.handoffs
            .iter()
            .copied()
            .find(|r| r.handoff_tool_name() == tool_name)
    }
}

/// The entry agent: routes between the cost tool and the three responders
pub fn triage_descriptor() -> AgentDescriptor {
    AgentDescriptor {
        id: AgentId::Triage,
        name: TRIAGE_AGENT_NAME.to_string(),
        handoff_description: "Routes product questions to the right specialist.".to_string(),
        instructions: TRIAGE_INSTRUCTIONS.to_string(),
        handoffs: vec![
            Responder::FinanceManager,
            Responder::ProductOwner,
            Responder::ProductReporter,
        ],
        tools: vec![ESTIMATE_COST_TOOL.to_string()],
    }
}
