//! The dispatch primitive.
//!
//! Dispatching is the one externally-visible side effect of the planner
//! and feeder: "spawn a worker against this bead on this pool". The real
//! process manager lives outside this workspace; everything here goes
//! through the [`Dispatcher`] trait.

use crate::bead::Bead;

/// An error raised by the dispatch primitive for a single bead.
///
/// Dispatch failures are per-bead. The planner records them in the launch
/// report and the feeder retries with backoff; neither promotes them to a
/// convoy-level failure.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("pool {pool} rejected {bead}: {reason}")]
    Rejected {
        bead: String,
        pool: String,
        reason: String,
    },
    #[error("pool {pool} unavailable: {reason}")]
    Unavailable { pool: String, reason: String },
}

/// Starts a worker on a bead.
///
/// Implementations must be idempotent on `(bead id, assignment key)`: a
/// second dispatch of an already-assigned bead must not spawn a second
/// worker.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, bead: &Bead, pool: &str) -> Result<(), DispatchError>;
}

/// A dispatcher that only logs.
///
/// The default primitive for the CLI when no process manager is wired in;
/// callers still mark the bead assigned through the store afterwards.
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn dispatch(&self, bead: &Bead, pool: &str) -> Result<(), DispatchError> {
        info!("dispatch {} ({}) -> pool {}", bead.id, bead.title, pool);
        Ok(())
    }
}
