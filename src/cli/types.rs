//! CLI command structures (clap derive).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "raven")]
#[command(about = "Raven - AI Agent Workflow Orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON instead of human-readable text
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Path to a TOML config file layered on top of defaults and env vars
    #[arg(long, global = true, env = "RAVEN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run shred, scatter, merge, and emit end to end
    Decompose(DecomposeArgs),

    /// C4: turn a PRD into a validated epic breakdown
    Shred(ShredArgs),

    /// C5: break each epic in a breakdown into implementation tasks
    Scatter(ScatterArgs),

    /// C6: sort, assign ids, remap dependencies, and deduplicate tasks
    Merge(MergeArgs),

    /// C8: write the final on-disk task artifacts
    Emit(EmitArgs),

    /// C7: validate the dependency graph and preview phase assignment
    Validate(ValidateArgs),

    /// C9: drive an AI coding agent through emitted tasks
    Loop(LoopArgs),
}

#[derive(Args)]
pub struct DecomposeArgs {
    /// Path to the PRD file
    #[arg(long)]
    pub prd: PathBuf,

    /// Scratch directory for intermediate shred/scatter artifacts
    #[arg(long)]
    pub work_dir: PathBuf,

    /// Directory to write the final task catalog into
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Overwrite existing files in `output_dir`
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ShredArgs {
    /// Path to the PRD file
    #[arg(long)]
    pub prd: PathBuf,

    /// Path to write the epic breakdown JSON to
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct ScatterArgs {
    /// Path to the PRD file
    #[arg(long)]
    pub prd: PathBuf,

    /// Path to the epic breakdown JSON produced by `shred`
    #[arg(long)]
    pub breakdown: PathBuf,

    /// Directory to write one `epic-<id>.json` per epic into
    #[arg(long)]
    pub work_dir: PathBuf,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Path to the epic breakdown JSON produced by `shred`
    #[arg(long)]
    pub breakdown: PathBuf,

    /// Directory containing the `epic-<id>.json` files produced by `scatter`
    #[arg(long)]
    pub work_dir: PathBuf,

    /// Path to write the merge artifact (tasks, depths, reports) to
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct EmitArgs {
    /// Path to the merge artifact produced by `merge`
    #[arg(long)]
    pub merged: PathBuf,

    /// Directory to write the final task catalog into
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Overwrite existing files in `output_dir`
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the merge artifact produced by `merge`
    #[arg(long)]
    pub merged: PathBuf,
}

#[derive(Args)]
pub struct LoopArgs {
    #[command(subcommand)]
    pub mode: LoopMode,
}

#[derive(Subcommand)]
pub enum LoopMode {
    /// Drive every task in one phase to completion
    Phase {
        /// Directory holding the emitted task catalog
        #[arg(long)]
        catalog_dir: PathBuf,

        /// 1-based phase ordinal to run
        #[arg(long)]
        phase_id: u32,

        /// Render the next prompt and print the agent command without running it
        #[arg(long)]
        dry_run: bool,
    },
    /// Drive a single task to completion, retrying while blocked
    Task {
        /// Directory holding the emitted task catalog
        #[arg(long)]
        catalog_dir: PathBuf,

        /// Global task id, e.g. `T-001`
        #[arg(long)]
        task_id: String,

        /// Render the next prompt and print the agent command without running it
        #[arg(long)]
        dry_run: bool,
    },
}
