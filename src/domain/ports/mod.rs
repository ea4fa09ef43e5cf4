//! Port traits: the seams at which the core algorithms meet external
//! collaborators (the agent subprocess, the event sink the caller supplies).

pub mod agent;
pub mod event_sink;

pub use agent::{Agent, AgentRequest, AgentResult, RateLimitSignal, StreamEvent};
pub use event_sink::EventSink;
