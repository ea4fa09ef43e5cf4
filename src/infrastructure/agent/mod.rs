//! C3 concrete implementations: a real subprocess-backed agent and a mock
//! for tests.

pub mod mock;
pub mod subprocess;

pub use mock::MockAgent;
pub use subprocess::{SubprocessAgent, SubprocessAgentConfig};
