//! On-disk handoff format between the `merge`, `emit`, `validate`, and
//! `loop` subcommands. `merge` produces one of these; every later stage
//! reads it back rather than recomputing the merge pipeline.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::models::MergedTask;

#[derive(Debug, Serialize, Deserialize)]
pub struct MergeArtifact {
    pub tasks: Vec<MergedTask>,
    pub depths: HashMap<String, u32>,
    pub epic_titles: HashMap<String, String>,
}

impl MergeArtifact {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
