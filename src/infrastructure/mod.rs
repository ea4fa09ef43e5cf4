//! Infrastructure layer: concrete adapters for the domain's port traits,
//! plus the ambient concerns (config, logging) that wire them together.

pub mod agent;
pub mod config;
pub mod logging;
pub mod rate_limit;
