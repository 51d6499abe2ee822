//! The bead store contract.
//!
//! The store owns all persistent state: beads, edges, and convoy records.
//! The planner and feeder only ever reach it through the [`BeadStore`]
//! trait, passed in explicitly. Two implementations ship with this crate:
//! an in-memory store and a JSON-file store layered on top of it.

use std::io;

use crossbeam::channel::Receiver;
use time::OffsetDateTime;

use crate::bead::{Bead, BeadKind, BeadPatch, BeadStatus, NewBead};
use crate::edge::{Edge, EdgeClass, EdgeDirection};
use crate::identifier::BeadId;

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// An error raised by a store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No bead named {0} found in store")]
    NotFound(BeadId),
    #[error("Bead {0} already exists")]
    AlreadyExists(BeadId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying on a later tick could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

/// What happened to a bead, as reported on the activity feed.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "detail")]
pub enum ActivityKind {
    Created,
    StatusChanged(BeadStatus),
    Assigned(String),
    EdgeAdded(EdgeClass),
    Closed,
}

/// One record of the store's append-only activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub bead: BeadId,
    pub actor: String,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

/// The store contract consumed by the planner and feeder.
///
/// Iteration order of listings is stable for a fixed store state; the
/// planner's determinism leans on that.
pub trait BeadStore: Send + Sync {
    /// Fetch a single bead.
    fn get(&self, id: &BeadId) -> Result<Bead, StoreError>;

    /// List the edges touching `id` in the given direction, restricted to
    /// the given classes. An empty class slice means every class.
    fn list_edges(
        &self,
        id: &BeadId,
        direction: EdgeDirection,
        classes: &[EdgeClass],
    ) -> Result<Vec<Edge>, StoreError>;

    /// List beads of a kind, optionally restricted to a status.
    fn list_by_kind(
        &self,
        kind: BeadKind,
        status: Option<BeadStatus>,
    ) -> Result<Vec<Bead>, StoreError>;

    /// Create a bead. The store mints an id when `new.id` is empty.
    fn create(&self, new: NewBead) -> Result<Bead, StoreError>;

    /// Apply a partial update.
    fn update(&self, id: &BeadId, patch: BeadPatch) -> Result<(), StoreError>;

    /// Close a bead, recording the reason.
    fn close(&self, id: &BeadId, reason: &str) -> Result<(), StoreError>;

    /// Add an edge. Adding an edge that already exists is a no-op.
    fn add_edge(&self, edge: Edge) -> Result<(), StoreError>;

    /// Remove an edge if present.
    fn remove_edge(&self, edge: &Edge) -> Result<(), StoreError>;

    /// Subscribe to the activity feed. The returned channel yields every
    /// event recorded after the call and disconnects when the store is
    /// dropped; it is not restartable.
    fn subscribe(&self) -> Receiver<ActivityEvent>;
}
