//! Conversation state, one turn at a time per session
//!
//! A [`Session`] owns the conversation history and serializes turns on an async
//! mutex held for the whole turn, so a second message waits until the first
//! turn's history has been written back.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{REFUSAL_MESSAGE, TurnError};
use crate::providers::{ChatMessage, ChatMessageContent, ChatRole};
use crate::router::{TriageRouter, TurnResult};

/// What the caller should show for a turn
#[derive(Debug, Clone)]
pub enum TurnReply {
    Answered(TurnResult),
    /// The guardrail vetoed the turn; history is untouched
    Refused(&'static str),
}

impl TurnReply {
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused(_))
    }

    pub fn result(&self) -> Option<&TurnResult> {
        match self {
            Self::Answered(result) => Some(result),
            Self::Refused(_) => None,
        }
    }
}

/// A single conversation with the triage router
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    router: Arc<TriageRouter>,
    history: Mutex<Vec<ChatMessage>>,
}

impl Session {
    /// Start a session with empty history
    pub fn new(router: Arc<TriageRouter>) -> Self {
        Self::with_history(router, Vec::new())
    }

    /// Start a session seeded with externally supplied history
    pub fn with_history(router: Arc<TriageRouter>, history: Vec<ChatMessage>) -> Self {
        let id = Uuid::new_v4();
        info!("Started session {} ({} history entries)", id, history.len());
        Self {
            id,
            started_at: Utc::now(),
            router,
            history: Mutex::new(history),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Snapshot of the current history
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().await.clone()
    }

    /// Drop all history, as at session start
    pub async fn reset(&self) {
        self.history.lock().await.clear();
        info!("Session {} history reset", self.id);
    }

    /// Process one user message.
    ///
    /// The effective input is the current history followed by `text`. On
    /// success the history is replaced by the transcript the turn produced. A
    /// tripped guardrail yields [`TurnReply::Refused`]; every other failure is
    /// returned unchanged. Neither touches the history.
    pub async fn handle_message(&self, text: &str) -> Result<TurnReply, TurnError> {
        let mut history = self.history.lock().await;

        let mut input = history.clone();
        input.push(ChatMessage::user(text));
        debug!(
            "Session {} turn input: {} entries",
            self.id,
            input.len()
        );

        match self.router.run(input).await {
            Ok(result) => {
                *history = result.history.clone();
                info!(
                    "Session {} turn handled by {} (history now {} entries)",
                    self.id,
                    result.agent,
                    history.len()
                );
                Ok(TurnReply::Answered(result))
            }
            Err(e) if e.is_guardrail_tripped() => {
                info!("Session {} turn refused: {}", self.id, e);
                Ok(TurnReply::Refused(REFUSAL_MESSAGE))
            }
            Err(e) => Err(e),
        }
    }
}

/// Number of user text messages in a history, i.e. completed user turns
pub fn user_turns(history: &[ChatMessage]) -> usize {
    history
        .iter()
        .filter(|m| m.role == ChatRole::User && matches!(m.content, ChatMessageContent::Text(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentId, Responder};
    use crate::guardrail::GuardrailGate;
    use crate::test_support::{ScriptedProvider, StubClassifier};
    use crate::tools::ToolRegistry;

    fn session_with(provider: Arc<ScriptedProvider>, classifier: Arc<StubClassifier>) -> Session {
        let router = TriageRouter::new(
            provider,
            Arc::new(ToolRegistry::with_builtins()),
            GuardrailGate::new(classifier),
        );
        Session::new(Arc::new(router))
    }

    #[tokio::test]
    async fn test_new_session_has_empty_history() {
        let session = session_with(
            Arc::new(ScriptedProvider::new()),
            Arc::new(StubClassifier::allow()),
        );
        assert!(session.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_cost_estimate_scenario() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_tool_call(
            "estimate_cost",
            serde_json::json!({"units": 100, "cost_per_unit": 5.0}),
        );
        let session = session_with(provider, Arc::new(StubClassifier::allow()));

        let reply = session
            .handle_message("Estimate the cost for 100 units at 5 each")
            .await
            .unwrap();
        let result = reply.result().unwrap();
        assert_eq!(result.output.as_structured().unwrap()["total_cost"], 500.0);
        assert!(!result.verdict.flagged);
        assert_eq!(session.history().await, result.history);
    }

    #[tokio::test]
    async fn test_refusal_leaves_history_unchanged_and_is_repeatable() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("Sure, let's plan it.");
        let session = session_with(
            provider.clone(),
            Arc::new(StubClassifier::flag_containing("literature review")),
        );

        session.handle_message("plan a widget launch").await.unwrap();
        let before = session.history().await;

        let mut refusals = Vec::new();
        for _ in 0..2 {
            let reply = session
                .handle_message("write a literature review on quantum computing")
                .await
                .unwrap();
            match reply {
                TurnReply::Refused(text) => refusals.push(text),
                TurnReply::Answered(r) => panic!("expected refusal, got {:?}", r.output),
            }
            assert_eq!(session.history().await, before);
        }

        assert_eq!(refusals, vec![REFUSAL_MESSAGE, REFUSAL_MESSAGE]);
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_history_accumulates_across_turns() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = session_with(provider.clone(), Arc::new(StubClassifier::allow()));

        let mut last_len = 0;
        for n in 1..=3 {
            provider.push_text(&format!("answer {}", n));
            session.handle_message(&format!("question {}", n)).await.unwrap();

            let history = session.history().await;
            assert!(history.len() >= last_len);
            assert_eq!(user_turns(&history), n);
            last_len = history.len();
        }
        assert_eq!(last_len, 6);
    }

    #[tokio::test]
    async fn test_second_turn_carries_first_turn_context() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_tool_call("transfer_to_product_owner", serde_json::json!({}));
        provider.push_text("Phase 1: tooling. Phase 2: pilot run.");
        provider.push_tool_call("transfer_to_product_reporter", serde_json::json!({}));
        provider.push_text("Report: two phases, tooling then pilot.");
        let classifier = Arc::new(StubClassifier::allow());
        let session = session_with(provider.clone(), classifier.clone());

        let first = session
            .handle_message("How should we plan production of a new kettle?")
            .await
            .unwrap();
        let first_history = first.result().unwrap().history.clone();
        assert!(matches!(
            first.result().unwrap().agent,
            AgentId::Responder(_)
        ));

        let second = session
            .handle_message("now summarize that as a report")
            .await
            .unwrap();
        let second = second.result().unwrap();
        assert_eq!(second.agent, AgentId::Responder(Responder::ProductReporter));

        // the second turn's first model call saw the whole first turn
        let second_turn_call = &provider.calls()[2];
        assert_eq!(
            &second_turn_call.messages[..first_history.len()],
            first_history.as_slice()
        );
        assert_eq!(
            second_turn_call.messages.last().unwrap(),
            &ChatMessage::user("now summarize that as a report")
        );

        // and so did the guardrail
        assert_eq!(
            classifier.seen_input_lengths(),
            vec![1, first_history.len() + 1]
        );
        assert_eq!(user_turns(&session.history().await), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_history() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("first answer");
        provider.push_error("connection reset");
        let session = session_with(provider, Arc::new(StubClassifier::allow()));

        session.handle_message("first").await.unwrap();
        let before = session.history().await;

        let err = session.handle_message("second").await.unwrap_err();
        assert!(matches!(err, TurnError::Upstream(_)));
        assert_eq!(session.history().await, before);
    }

    #[tokio::test]
    async fn test_malformed_verdict_refuses_by_default() {
        let session = session_with(
            Arc::new(ScriptedProvider::new()),
            Arc::new(StubClassifier::malformed()),
        );
        let reply = session.handle_message("hello").await.unwrap();
        assert!(reply.is_refused());
        assert!(session.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_seeded_history_and_reset() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("Continuing from before.");
        let router = TriageRouter::new(
            provider.clone(),
            Arc::new(ToolRegistry::with_builtins()),
            GuardrailGate::new(Arc::new(StubClassifier::allow())),
        );
        let seed = vec![
            ChatMessage::user("We make kettles."),
            ChatMessage::assistant("Noted."),
        ];
        let session = Session::with_history(Arc::new(router), seed.clone());

        session.handle_message("what next?").await.unwrap();
        assert_eq!(provider.calls()[0].messages[..2], seed[..]);
        assert_eq!(session.history().await.len(), 4);

        session.reset().await;
        assert!(session.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("one");
        provider.push_text("two");
        let session = Arc::new(session_with(
            provider.clone(),
            Arc::new(StubClassifier::allow()),
        ));

        let a = tokio::spawn({
            let session = session.clone();
            async move { session.handle_message("first").await.map(|_| ()) }
        });
        let b = tokio::spawn({
            let session = session.clone();
            async move { session.handle_message("second").await.map(|_| ()) }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let calls = provider.calls();
        // whichever turn ran second saw the first turn's two entries
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[1].messages.len(), 3);
        assert_eq!(user_turns(&session.history().await), 2);
    }
}
