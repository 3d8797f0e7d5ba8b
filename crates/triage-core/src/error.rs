use thiserror::Error;

use crate::agents::AgentId;
use crate::guardrail::Verdict;

/// The fixed message shown when the guardrail vetoes a turn
pub const REFUSAL_MESSAGE: &str =
    "Sorry, but I'm not allowed to respond to any academic research question.";

/// Why a turn did not produce a result
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("input guardrail tripped: {}", .verdict.reasoning)]
    GuardrailTripped { verdict: Verdict },
    #[error("guardrail classifier returned a malformed verdict: {raw}")]
    MalformedVerdict { raw: String },
    #[error("agent loop exceeded {0} model calls")]
    MaxTurnsExceeded(usize),
    #[error("{agent} ended its turn without output")]
    EmptyResponse { agent: AgentId },
    #[error("{agent} hit the output token limit before finishing its answer")]
    OutputTruncated { agent: AgentId },
    #[error("cost estimate requested but the model answered without calling {tool}")]
    CostEstimateUnavailable { tool: &'static str },
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl TurnError {
    pub fn is_guardrail_tripped(&self) -> bool {
        matches!(self, Self::GuardrailTripped { .. })
    }

    /// User-facing text for errors that have one. Only a tripped guardrail does.
    pub fn refusal_message(&self) -> Option<&'static str> {
        match self {
            Self::GuardrailTripped { .. } => Some(REFUSAL_MESSAGE),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_tripwire_has_refusal() {
        let tripped = TurnError::GuardrailTripped {
            verdict: Verdict {
                flagged: true,
                reasoning: "asks for a literature review".to_string(),
            },
        };
        assert!(tripped.is_guardrail_tripped());
        assert_eq!(tripped.refusal_message(), Some(REFUSAL_MESSAGE));
        assert!(tripped.to_string().contains("literature review"));

        let upstream = TurnError::from(anyhow::anyhow!("401 Unauthorized"));
        assert!(!upstream.is_guardrail_tripped());
        assert_eq!(upstream.refusal_message(), None);
        assert_eq!(upstream.to_string(), "401 Unauthorized");
    }
}
