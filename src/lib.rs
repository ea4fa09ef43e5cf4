//! Raven — AI agent workflow orchestrator.
//!
//! Decomposes a product requirements document into a dependency-ordered
//! catalog of implementation tasks, then drives AI coding agents through
//! those tasks under rate-limit and failure discipline:
//! - C1 schema validation, C2 rate-limit coordination, C3 the agent
//!   subprocess contract
//! - C4 shred (PRD → epics), C5 scatter (epic → tasks)
//! - C6 merge (sort, id assignment, dependency remap, dedup)
//! - C7 DAG validation + phase assignment, C8 on-disk emission
//! - C9 the implementation loop

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod prompts;
pub mod services;

pub use domain::RavenError;
