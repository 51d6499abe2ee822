//! An in-memory bead store.

use std::collections::BTreeMap;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use time::OffsetDateTime;

use crate::bead::{Bead, BeadKind, BeadPatch, BeadStatus, NewBead};
use crate::edge::{Edge, EdgeClass, EdgeDirection};
use crate::identifier::BeadId;
use crate::store::{ActivityEvent, ActivityKind, BeadStore, StoreError};

/// The actor name the store records for its own activity events.
const STORE_ACTOR: &str = "store";

/// An in-memory [`BeadStore`].
///
/// Beads live in a `BTreeMap` so every listing iterates in id order,
/// edges keep their insertion order. This is the primary store for tests
/// and the engine behind [`JsonFileStore`](super::JsonFileStore).
pub struct MemoryStore {
    state: RwLock<State>,
    subscribers: RwLock<Vec<Sender<ActivityEvent>>>,
}

#[derive(Default, Serialize, Deserialize)]
pub(crate) struct State {
    pub(crate) beads: BTreeMap<BeadId, Bead>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) next_seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn from_state(state: State) -> Self {
        Self {
            state: RwLock::new(state),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn snapshot(&self) -> State {
        let state = self.state.read();
        State {
            beads: state.beads.clone(),
            edges: state.edges.clone(),
            next_seq: state.next_seq,
        }
    }

    fn broadcast(&self, bead: &BeadId, kind: ActivityKind) {
        let event = ActivityEvent {
            ts: OffsetDateTime::now_utc(),
            bead: bead.clone(),
            actor: STORE_ACTOR.to_string(),
            kind,
        };
        // drop senders whose receiver went away
        self.subscribers
            .write()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn mint_id(state: &mut State, kind: BeadKind) -> BeadId {
        let prefix = match kind {
            BeadKind::Convoy => "cv",
            _ => "b",
        };
        loop {
            state.next_seq += 1;
            let candidate = BeadId::new(format!("{}-{}", prefix, state.next_seq))
                .expect("minted ids are always valid");
            if !state.beads.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BeadStore for MemoryStore {
    fn get(&self, id: &BeadId) -> Result<Bead, StoreError> {
        self.state
            .read()
            .beads
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn list_edges(
        &self,
        id: &BeadId,
        direction: EdgeDirection,
        classes: &[EdgeClass],
    ) -> Result<Vec<Edge>, StoreError> {
        let state = self.state.read();
        if !state.beads.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let edges = state
            .edges
            .iter()
            .filter(|edge| {
                (direction.includes_outgoing() && &edge.from == id)
                    || (direction.includes_incoming() && &edge.to == id)
            })
            .filter(|edge| classes.is_empty() || classes.contains(&edge.class))
            .cloned()
            .collect();
        Ok(edges)
    }

    fn list_by_kind(
        &self,
        kind: BeadKind,
        status: Option<BeadStatus>,
    ) -> Result<Vec<Bead>, StoreError> {
        let state = self.state.read();
        Ok(state
            .beads
            .values()
            .filter(|bead| bead.kind == kind)
            .filter(|bead| status.map(|s| bead.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn create(&self, new: NewBead) -> Result<Bead, StoreError> {
        let bead = {
            let mut state = self.state.write();
            let id = match new.id {
                Some(id) => {
                    if state.beads.contains_key(&id) {
                        return Err(StoreError::AlreadyExists(id));
                    }
                    id
                }
                None => Self::mint_id(&mut state, new.kind),
            };
            let bead = Bead {
                id: id.clone(),
                kind: new.kind,
                status: new.status,
                title: new.title,
                body: new.body,
                labels: new.labels,
                assignee: None,
                needs_integration_branch: new.needs_integration_branch,
                created_at: OffsetDateTime::now_utc(),
                closed_at: None,
            };
            state.beads.insert(id, bead.clone());
            bead
        };
        self.broadcast(&bead.id, ActivityKind::Created);
        Ok(bead)
    }

    fn update(&self, id: &BeadId, patch: BeadPatch) -> Result<(), StoreError> {
        let mut events = Vec::new();
        {
            let mut state = self.state.write();
            let bead = state
                .beads
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if let Some(status) = patch.status {
                if bead.status != status {
                    bead.status = status;
                    if status.is_closed() {
                        bead.closed_at = Some(OffsetDateTime::now_utc());
                    }
                    events.push(ActivityKind::StatusChanged(status));
                }
            }
            if let Some(title) = patch.title {
                bead.title = title;
            }
            if let Some(body) = patch.body {
                bead.body = body;
            }
            if let Some(assignee) = patch.assignee {
                if let Some(worker) = &assignee {
                    events.push(ActivityKind::Assigned(worker.clone()));
                }
                bead.assignee = assignee;
            }
        }
        for kind in events {
            self.broadcast(id, kind);
        }
        Ok(())
    }

    fn close(&self, id: &BeadId, reason: &str) -> Result<(), StoreError> {
        {
            let mut state = self.state.write();
            let bead = state
                .beads
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            bead.status = BeadStatus::Closed;
            bead.closed_at = Some(OffsetDateTime::now_utc());
            if !reason.is_empty() {
                if !bead.body.is_empty() {
                    bead.body.push('\n');
                }
                bead.body.push_str("closed: ");
                bead.body.push_str(reason);
            }
        }
        self.broadcast(id, ActivityKind::Closed);
        Ok(())
    }

    fn add_edge(&self, edge: Edge) -> Result<(), StoreError> {
        {
            let mut state = self.state.write();
            if !state.beads.contains_key(&edge.from) {
                return Err(StoreError::NotFound(edge.from.clone()));
            }
            if !state.beads.contains_key(&edge.to) {
                return Err(StoreError::NotFound(edge.to.clone()));
            }
            if state.edges.contains(&edge) {
                return Ok(());
            }
            state.edges.push(edge.clone());
        }
        self.broadcast(&edge.from, ActivityKind::EdgeAdded(edge.class));
        Ok(())
    }

    fn remove_edge(&self, edge: &Edge) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.edges.retain(|existing| existing != edge);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<ActivityEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        receiver
    }
}
