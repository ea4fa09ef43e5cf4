//! Domain layer for the Raven orchestration engine.
//!
//! Contains record types (`models`), the port traits external collaborators
//! implement (`ports`), and the error taxonomy (`error`).

pub mod error;
pub mod models;
pub mod ports;

pub use error::RavenError;
