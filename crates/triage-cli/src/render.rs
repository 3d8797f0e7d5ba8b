//! Terminal rendering of turn replies

use triage_core::{TurnOutput, TurnReply};

pub const WELCOME_MESSAGE: &str = "**Hi! I'm your Product Triage Agent.**

I can:
• Route your question to the right specialist (Product Owner, Reporter, Finance Manager)
• Call handy tools like a quick cost estimator (try: *Estimate the cost for 100 units at 5 each*)

Ask me anything about your manufacturing product plans, reports, costs; however, no academic research question can be asked, they will be prevented.";

/// Render a reply the way the chat surface shows it
pub fn render_reply(reply: &TurnReply) -> String {
    match reply {
        TurnReply::Refused(text) => text.to_string(),
        TurnReply::Answered(result) => format!(
            "**{}** handled your question:\n\n{}",
            result.agent_name(),
            render_output(&result.output)
        ),
    }
}

/// Mappings and sequences are pretty-printed as a JSON code block
pub fn render_output(output: &TurnOutput) -> String {
    match output {
        TurnOutput::Text(text) => text.clone(),
        TurnOutput::Structured(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("```json\n{}\n```", pretty)
        }
    }
}
