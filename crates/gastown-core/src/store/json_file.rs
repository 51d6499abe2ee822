//! A single-document JSON store.

use std::fs;
use std::path::{Path, PathBuf};

use crossbeam::channel::Receiver;

use crate::bead::{Bead, BeadKind, BeadPatch, BeadStatus, NewBead};
use crate::edge::{Edge, EdgeClass, EdgeDirection};
use crate::identifier::BeadId;
use crate::store::memory::{MemoryStore, State};
use crate::store::{ActivityEvent, BeadStore, StoreError};

/// A [`BeadStore`] persisted as one JSON document on disk.
///
/// The whole image is loaded into a [`MemoryStore`] at open and written
/// back after every mutation. Good enough for the operator commands; a
/// deployment-grade store sits behind the same trait.
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open a store file, creating an empty store if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let state: State = serde_json::from_str(&raw)?;
            debug!(
                "loaded {} beads, {} edges from {}",
                state.beads.len(),
                state.edges.len(),
                path.display()
            );
            MemoryStore::from_state(state)
        } else {
            info!("no store at {}, starting empty", path.display());
            MemoryStore::new()
        };
        Ok(Self { path, inner })
    }

    /// Where this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(&self.inner.snapshot())?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl BeadStore for JsonFileStore {
    fn get(&self, id: &BeadId) -> Result<Bead, StoreError> {
        self.inner.get(id)
    }

    fn list_edges(
        &self,
        id: &BeadId,
        direction: EdgeDirection,
        classes: &[EdgeClass],
    ) -> Result<Vec<Edge>, StoreError> {
        self.inner.list_edges(id, direction, classes)
    }

    fn list_by_kind(
        &self,
        kind: BeadKind,
        status: Option<BeadStatus>,
    ) -> Result<Vec<Bead>, StoreError> {
        self.inner.list_by_kind(kind, status)
    }

    fn create(&self, new: NewBead) -> Result<Bead, StoreError> {
        let bead = self.inner.create(new)?;
        self.persist()?;
        Ok(bead)
    }

    fn update(&self, id: &BeadId, patch: BeadPatch) -> Result<(), StoreError> {
        self.inner.update(id, patch)?;
        self.persist()
    }

    fn close(&self, id: &BeadId, reason: &str) -> Result<(), StoreError> {
        self.inner.close(id, reason)?;
        self.persist()
    }

    fn add_edge(&self, edge: Edge) -> Result<(), StoreError> {
        self.inner.add_edge(edge)?;
        self.persist()
    }

    fn remove_edge(&self, edge: &Edge) -> Result<(), StoreError> {
        self.inner.remove_edge(edge)?;
        self.persist()
    }

    fn subscribe(&self) -> Receiver<ActivityEvent> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beads.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store
                .create(NewBead::new(BeadKind::Task, "weld the tank").with_id("gt-1".parse().unwrap()))
                .unwrap();
            store
                .create(NewBead::new(BeadKind::Task, "paint it").with_id("gt-2".parse().unwrap()))
                .unwrap();
            store
                .add_edge(Edge::new(
                    "gt-1".parse().unwrap(),
                    "gt-2".parse().unwrap(),
                    EdgeClass::Blocks,
                ))
                .unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        let bead = reopened.get(&"gt-1".parse().unwrap()).unwrap();
        assert_eq!(bead.title, "weld the tank");
        let edges = reopened
            .list_edges(&"gt-2".parse().unwrap(), EdgeDirection::Incoming, &[])
            .unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("fresh.json")).unwrap();
        assert!(store.list_by_kind(BeadKind::Task, None).unwrap().is_empty());
    }

    #[test]
    fn minted_ids_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beads.json");
        let first = {
            let store = JsonFileStore::open(&path).unwrap();
            store
                .create(NewBead::new(BeadKind::Convoy, "war rig run"))
                .unwrap()
                .id
        };
        let reopened = JsonFileStore::open(&path).unwrap();
        let second = reopened
            .create(NewBead::new(BeadKind::Convoy, "second run"))
            .unwrap()
            .id;
        assert_ne!(first, second);
    }
}
