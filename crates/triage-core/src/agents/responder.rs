//! The closed set of specialist responders

use serde::{Deserialize, Serialize};

use super::descriptor::{AgentDescriptor, AgentId};
use crate::tools::estimate_cost::ESTIMATE_COST_TOOL;

/// Specialist agents the triage agent can hand a turn off to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Responder {
    /// Product execution planning, ownership, success and drawbacks
    ProductOwner,
    /// Product data reporting
    ProductReporter,
    /// The product's financial affairs
    FinanceManager,
}

impl Responder {
    pub const ALL: [Responder; 3] = [
        Responder::ProductOwner,
        Responder::ProductReporter,
        Responder::FinanceManager,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductOwner => "product owner",
            Self::ProductReporter => "product reporter",
            Self::FinanceManager => "product finance manager",
        }
    }

    pub fn handoff_description(&self) -> &'static str {
        match self {
            Self::ProductOwner => {
                "Special Agent for product's execution planning, success, and drawbacks."
            }
            Self::ProductReporter => "Special Agent for product data reporting",
            Self::FinanceManager => "Special Agent for product's financial affairs.",
        }
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            Self::ProductOwner => {
                "You are a helpful product owner that assists in initiating to executing any \
                 product related to manufacturing industry."
            }
            Self::ProductReporter => {
                "You are a helpful product reporter that assists in making full report based \
                 on the product discussed."
            }
            Self::FinanceManager => {
                "You are a helpful product finance manager that assists in sorting the cost of \
                 the project execution."
            }
        }
    }

    /// Name of the synthetic tool the triage agent calls to hand off here
    pub fn handoff_tool_name(&self) -> String {
        format!("transfer_to_{}", self.name().replace(' ', "_"))
    }

    pub fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::Responder(*self),
            name: self.name().to_string(),
            handoff_description: self.handoff_description().to_string(),
            instructions: self.instructions().to_string(),
            handoffs: Vec::new(),
            tools: vec![ESTIMATE_COST_TOOL.to_string()],
        }
    }
}

impl std::fmt::Display for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_tool_names() {
        assert_eq!(
            Responder::ProductOwner.handoff_tool_name(),
            "transfer_to_product_owner"
        );
        assert_eq!(
            Responder::ProductReporter.handoff_tool_name(),
            "transfer_to_product_reporter"
        );
        assert_eq!(
            Responder::FinanceManager.handoff_tool_name(),
            "transfer_to_product_finance_manager"
        );
    }

    #[test]
    fn test_descriptor_identity() {
        let d = Responder::FinanceManager.descriptor();
        assert_eq!(d.id, AgentId::Responder(Responder::FinanceManager));
        assert_eq!(d.name, "product finance manager");
        assert!(d.instructions.contains("finance manager"));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Responder::ProductOwner).unwrap();
        assert_eq!(json, "\"product_owner\"");
    }
}
