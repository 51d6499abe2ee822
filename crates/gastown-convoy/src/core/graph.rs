//! The in-memory dependency graph of one working set.

use std::collections::HashMap;

use gastown_core::bead::Bead;
use gastown_core::edge::{Edge, EdgeClass};
use gastown_core::identifier::BeadId;
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// The shape of the working set the graph was built from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WorkingShape {
    /// A single epic, expanded through `parent-child` edges
    Epic(BeadId),
    /// An explicit list of ids, used verbatim
    List,
    /// An existing convoy, expanded through its `tracks` edges
    Convoy(BeadId),
}

/// A bundle of beads plus the typed edges among them, restricted to the
/// working set selected at stage time.
///
/// Beads keep the store's iteration order; edges whose other endpoint is
/// outside the set are kept aside as dangling blockers for orphan analysis
/// and never become graph edges.
#[derive(Debug)]
pub struct DepGraph {
    shape: WorkingShape,
    beads: IndexMap<BeadId, Bead>,
    graph: DiGraph<BeadId, EdgeClass>,
    indices: HashMap<BeadId, NodeIndex>,
    dangling: Vec<Edge>,
}

impl DepGraph {
    pub(crate) fn new(shape: WorkingShape) -> Self {
        Self {
            shape,
            beads: IndexMap::new(),
            graph: DiGraph::new(),
            indices: HashMap::new(),
            dangling: Vec::new(),
        }
    }

    /// Add a bead to the set. Duplicates collapse to one node.
    pub(crate) fn insert_bead(&mut self, bead: Bead) {
        if self.beads.contains_key(&bead.id) {
            return;
        }
        let index = self.graph.add_node(bead.id.clone());
        self.indices.insert(bead.id.clone(), index);
        self.beads.insert(bead.id.clone(), bead);
    }

    /// Add an in-set edge. Both endpoints must already be inserted; the
    /// same `(from, to, class)` triple is only kept once.
    pub(crate) fn insert_edge(&mut self, edge: &Edge) {
        let (Some(&from), Some(&to)) = (self.indices.get(&edge.from), self.indices.get(&edge.to))
        else {
            return;
        };
        let duplicate = self
            .graph
            .edges_connecting(from, to)
            .any(|existing| *existing.weight() == edge.class);
        if !duplicate {
            self.graph.add_edge(from, to, edge.class);
        }
    }

    pub(crate) fn insert_dangling(&mut self, edge: Edge) {
        if !self.dangling.contains(&edge) {
            self.dangling.push(edge);
        }
    }

    pub fn shape(&self) -> &WorkingShape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.beads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beads.is_empty()
    }

    pub fn contains(&self, id: &BeadId) -> bool {
        self.beads.contains_key(id)
    }

    pub fn bead(&self, id: &BeadId) -> Option<&Bead> {
        self.beads.get(id)
    }

    /// All beads in store order.
    pub fn beads(&self) -> impl Iterator<Item = &Bead> {
        self.beads.values()
    }

    /// Every bead id, sorted lexically.
    pub fn ids_sorted(&self) -> Vec<&BeadId> {
        let mut ids: Vec<_> = self.beads.keys().collect();
        ids.sort();
        ids
    }

    /// The schedulable beads, sorted lexically by id.
    pub fn schedulable(&self) -> Vec<&Bead> {
        let mut beads: Vec<_> = self
            .beads
            .values()
            .filter(|bead| bead.kind.is_schedulable())
            .collect();
        beads.sort_by(|a, b| a.id.cmp(&b.id));
        beads
    }

    /// Blocking edges whose other endpoint lies outside the working set.
    pub fn dangling_blockers(&self) -> &[Edge] {
        &self.dangling
    }

    fn neighbors_via(
        &self,
        id: &BeadId,
        direction: Direction,
        filter: impl Fn(EdgeClass) -> bool,
    ) -> Vec<&BeadId> {
        let Some(&index) = self.indices.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&BeadId> = self
            .graph
            .edges_directed(index, direction)
            .filter(|edge| filter(*edge.weight()))
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                &self.graph[other]
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// In-set beads this bead blocks, sorted lexically.
    pub fn blocking_successors(&self, id: &BeadId) -> Vec<&BeadId> {
        self.neighbors_via(id, Direction::Outgoing, |class| class.is_blocking())
    }

    /// In-set beads blocking this bead, sorted lexically.
    pub fn blocking_predecessors(&self, id: &BeadId) -> Vec<&BeadId> {
        self.neighbors_via(id, Direction::Incoming, |class| class.is_blocking())
    }

    /// `parent-child` children of a bead, sorted lexically.
    pub fn children(&self, id: &BeadId) -> Vec<&BeadId> {
        self.neighbors_via(id, Direction::Outgoing, |class| {
            class == EdgeClass::ParentChild
        })
    }

    /// Whether any in-set blocking edge touches this bead.
    pub fn has_blocking_contact(&self, id: &BeadId) -> bool {
        !self.blocking_predecessors(id).is_empty() || !self.blocking_successors(id).is_empty()
    }
}
