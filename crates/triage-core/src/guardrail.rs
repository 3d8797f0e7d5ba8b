//! Input guardrail that vetoes academic-research requests before triage runs
//!
//! A [`GuardrailClassifier`] turns the turn's input into a [`Verdict`]; the
//! [`GuardrailGate`] decides from that verdict whether the turn may proceed.
//! The gate holds no state between turns: every check starts from
//! [`GateState::Open`].

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::TurnError;
use crate::providers::{ChatMessage, LlmProvider, ToolChoice};

const CLASSIFIER_INSTRUCTIONS: &str = "Check if the user is asking to generate content of \
    academic research (papers, literature reviews, theses, research proposals and similar). \
    Respond with ONLY a JSON object of the form \
    {\"flagged\": <true|false>, \"reasoning\": \"<one sentence>\"} and nothing else.";

/// Classifier output for one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// True when the request belongs to the disallowed category
    pub flagged: bool,
    pub reasoning: String,
}

/// Turns a turn's input into a [`Verdict`]
#[async_trait]
pub trait GuardrailClassifier: Send + Sync {
    async fn classify(&self, input: &[ChatMessage]) -> Result<Verdict, TurnError>;
}

/// Production classifier backed by a model call
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl GuardrailClassifier for LlmClassifier {
    async fn classify(&self, input: &[ChatMessage]) -> Result<Verdict, TurnError> {
        let response = self
            .provider
            .chat(input, &[], CLASSIFIER_INSTRUCTIONS, &ToolChoice::Auto)
            .await
            .context("Guardrail classification request failed")?;

        parse_verdict(&response.text())
    }
}

/// Parse a verdict from model text, tolerating markdown code fences and
/// surrounding prose.
pub fn parse_verdict(raw: &str) -> Result<Verdict, TurnError> {
    let malformed = || TurnError::MalformedVerdict {
        raw: raw.to_string(),
    };

    let start = raw.find('{').ok_or_else(malformed)?;
    let end = raw.rfind('}').ok_or_else(malformed)?;
    if end < start {
        return Err(malformed());
    }

    serde_json::from_str(&raw[start..=end]).map_err(|e| {
        debug!("Verdict JSON did not parse: {}", e);
        malformed()
    })
}

/// Gate state within a single turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// Admits the turn into the router
    #[default]
    Open,
    /// Aborts the turn
    Tripped,
}

impl GateState {
    /// OPEN→TRIPPED iff the verdict is flagged
    pub fn after(self, verdict: &Verdict) -> GateState {
        match self {
            Self::Open if verdict.flagged => Self::Tripped,
            state => state,
        }
    }
}

/// What to do when the classifier's answer is not a valid verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedVerdictPolicy {
    /// Fail closed: treat the turn as flagged
    #[default]
    Trip,
    /// Fail the turn with [`TurnError::MalformedVerdict`]
    Fail,
}

/// Wraps a classifier and vetoes flagged turns
pub struct GuardrailGate {
    classifier: Arc<dyn GuardrailClassifier>,
    on_malformed: MalformedVerdictPolicy,
}

impl GuardrailGate {
    pub fn new(classifier: Arc<dyn GuardrailClassifier>) -> Self {
        Self {
            classifier,
            on_malformed: MalformedVerdictPolicy::default(),
        }
    }

    /// Set the malformed-verdict policy
    pub fn with_malformed_policy(mut self, policy: MalformedVerdictPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    /// Classify `input` and admit or veto the turn.
    ///
    /// Returns the verdict when the gate stays open. A tripped gate surfaces as
    /// [`TurnError::GuardrailTripped`]; classifier failures other than a
    /// malformed verdict propagate unchanged.
    pub async fn check(&self, input: &[ChatMessage]) -> Result<Verdict, TurnError> {
        let state = GateState::Open;

        let verdict = match self.classifier.classify(input).await {
            Ok(verdict) => verdict,
            Err(TurnError::MalformedVerdict { raw })
                if self.on_malformed == MalformedVerdictPolicy::Trip =>
            {
                warn!("Malformed guardrail verdict, failing closed: {}", raw);
                Verdict {
                    flagged: true,
                    reasoning: "Guardrail verdict could not be parsed".to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        debug!("Guardrail verdict: {:?}", verdict);

        match state.after(&verdict) {
            GateState::Open => Ok(verdict),
            GateState::Tripped => {
                info!("Guardrail tripped: {}", verdict.reasoning);
                Err(TurnError::GuardrailTripped { verdict })
            }
        }
    }
}
