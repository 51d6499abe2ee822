//! Operator args for the planner commands.

use clap::Args;

/// Validate a working set and mint or refresh a convoy.
///
/// Inputs are either one epic id (expanded through its children), an
/// explicit list of bead ids, or one existing convoy id (re-staged in
/// place). Shapes cannot be mixed.
#[derive(Debug, Clone, Args)]
pub struct StageArgs {
    /// The beads to stage: an epic id, a list of bead ids, or a convoy id
    #[clap(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Launch immediately after a successful stage
    #[clap(long)]
    pub launch: bool,

    /// Acknowledge warnings when launching
    #[clap(long)]
    pub force: bool,

    /// Emit the machine-readable report instead of the tree and wave table
    #[clap(long)]
    pub json: bool,

    /// Refresh this convoy instead of minting a new one
    #[clap(long, value_name = "CONVOY_ID")]
    pub reuse: Option<String>,
}

/// Launch a staged convoy and dispatch its first wave.
#[derive(Debug, Clone, Args)]
pub struct LaunchArgs {
    /// The convoy to launch
    pub convoy_id: String,

    /// Launch even if the convoy staged with warnings
    #[clap(long)]
    pub force: bool,

    /// Emit a machine-readable result
    #[clap(long)]
    pub json: bool,
}

/// Show a convoy's progress through its waves.
#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// The convoy to inspect
    pub convoy_id: String,

    /// Emit a machine-readable result
    #[clap(long)]
    pub json: bool,
}
