//! The triage entry agent and its specialist responders
//!
//! Descriptors are built once at startup and never change afterwards. The
//! triage descriptor lists every [`Responder`] as a handoff target; responders
//! list none, so delegation is at most one level deep.

pub mod descriptor;
pub mod responder;

pub use descriptor::{AgentDescriptor, AgentId, TRIAGE_AGENT_NAME, triage_descriptor};
pub use responder::Responder;
