//! Error taxonomy of the planner.

use gastown_core::identifier::{BeadId, InvalidBeadId};
use gastown_core::store::StoreError;
use itertools::Itertools;
use thiserror::Error;

/// An error raised while staging or launching a convoy.
///
/// Everything here aborts the current invocation and leaves no partial
/// convoy behind; per-bead dispatch failures are *not* errors of this type,
/// they're recorded in the launch outcome and retried by the feeder.
#[derive(Debug, Error)]
pub enum StageError {
    /// Bad operator input: unknown ids, mixed input shapes, empty working
    /// set, or a convoy id pointing at something that isn't a convoy.
    #[error("{0}")]
    Input(String),
    /// A cycle in the blocking subgraph.
    #[error("Cycle found between beads {}", cycles.iter().map(|c| format!("[{}]", c.iter().join(" -> "))).join("; "))]
    Structural { cycles: Vec<Vec<BeadId>> },
    /// Beads whose prefix resolves to no pool.
    #[error("No valid routing for {}", ids.iter().join(", "))]
    Routing { ids: Vec<BeadId> },
    /// A launch (or re-stage) against a convoy status that forbids it.
    #[error("Cannot {action} convoy {convoy} ({status}){}", render_warning_summary(warnings))]
    Transition {
        convoy: BeadId,
        status: String,
        action: String,
        warnings: Vec<String>,
    },
    #[error(transparent)]
    InvalidId(#[from] InvalidBeadId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn render_warning_summary(warnings: &[String]) -> String {
    if warnings.is_empty() {
        String::new()
    } else {
        format!(
            ":\n{}",
            warnings.iter().map(|w| format!("  - {w}")).join("\n")
        )
    }
}

/// Map a store lookup failure of an operator-supplied id onto the input
/// error it really is.
pub(crate) fn input_not_found(err: StoreError) -> StageError {
    match err {
        StoreError::NotFound(id) => StageError::Input(format!("no bead named {} exists", id)),
        other => StageError::Store(other),
    }
}

pub type ConvoyResult<T> = Result<T, StageError>;
