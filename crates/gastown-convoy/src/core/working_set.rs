//! Working set resolution: which beads a stage invocation addresses.

use std::collections::HashSet;

use gastown_core::bead::BeadKind;
use gastown_core::edge::{Edge, EdgeClass, EdgeDirection};
use gastown_core::identifier::BeadId;
use gastown_core::store::BeadStore;

use crate::core::graph::{DepGraph, WorkingShape};
use crate::utils::{input_not_found, ConvoyResult, StageError};

/// The edge classes the graph builder loads from the store.
const LOADED_CLASSES: [EdgeClass; 4] = [
    EdgeClass::Blocks,
    EdgeClass::ConditionalBlocks,
    EdgeClass::WaitsFor,
    EdgeClass::ParentChild,
];

/// The three input shapes a stage invocation accepts.
///
/// Shapes may not be mixed: an epic or convoy id must stand alone.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WorkingSetSpec {
    /// A single epic, expanded by walking `parent-child` transitively
    Epic(BeadId),
    /// An explicit list of ids, used verbatim
    List(Vec<BeadId>),
    /// An existing convoy; the set is whatever its `tracks` edges bind
    Convoy(BeadId),
}

impl WorkingSetSpec {
    /// Decide the shape of raw operator inputs.
    ///
    /// A single id resolves through the store to pick between the three
    /// shapes; with several ids every one of them must be an ordinary
    /// bead.
    pub fn infer(store: &dyn BeadStore, inputs: &[String]) -> ConvoyResult<Self> {
        if inputs.is_empty() {
            return Err(StageError::Input("no beads were addressed".to_string()));
        }
        let ids = inputs
            .iter()
            .map(|raw| raw.parse::<BeadId>())
            .collect::<Result<Vec<_>, _>>()?;

        if ids.len() == 1 {
            let bead = store.get(&ids[0]).map_err(input_not_found)?;
            return Ok(match bead.kind {
                BeadKind::Epic => WorkingSetSpec::Epic(bead.id),
                BeadKind::Convoy => WorkingSetSpec::Convoy(bead.id),
                _ => WorkingSetSpec::List(ids),
            });
        }

        for id in &ids {
            let bead = store.get(id).map_err(input_not_found)?;
            if matches!(bead.kind, BeadKind::Epic | BeadKind::Convoy) {
                return Err(StageError::Input(format!(
                    "cannot mix input shapes: {} is a {} and must be staged alone",
                    bead.id, bead.kind
                )));
            }
        }
        Ok(WorkingSetSpec::List(ids))
    }

    /// The convoy to refresh, when the shape already names one.
    pub fn reuse_convoy(&self) -> Option<&BeadId> {
        match self {
            WorkingSetSpec::Convoy(id) => Some(id),
            _ => None,
        }
    }
}

/// Resolve a working set specification against the store and build the
/// dependency graph over it.
pub fn build_graph(store: &dyn BeadStore, spec: &WorkingSetSpec) -> ConvoyResult<DepGraph> {
    let mut graph = match spec {
        WorkingSetSpec::Epic(root) => {
            let mut graph = DepGraph::new(WorkingShape::Epic(root.clone()));
            collect_epic(store, root, &mut graph)?;
            graph
        }
        WorkingSetSpec::List(ids) => {
            let mut graph = DepGraph::new(WorkingShape::List);
            for id in ids {
                graph.insert_bead(store.get(id).map_err(input_not_found)?);
            }
            graph
        }
        WorkingSetSpec::Convoy(id) => {
            let convoy = store.get(id).map_err(input_not_found)?;
            if convoy.kind != BeadKind::Convoy {
                return Err(StageError::Input(format!(
                    "{} is a {}, not a convoy",
                    convoy.id, convoy.kind
                )));
            }
            let mut graph = DepGraph::new(WorkingShape::Convoy(id.clone()));
            let tracks = store.list_edges(id, EdgeDirection::Outgoing, &[EdgeClass::Tracks])?;
            for edge in tracks {
                graph.insert_bead(store.get(&edge.to).map_err(input_not_found)?);
            }
            graph
        }
    };

    if graph.is_empty() {
        return Err(StageError::Input("the working set is empty".to_string()));
    }

    load_edges(store, &mut graph)?;
    Ok(graph)
}

/// Depth-first walk over `parent-child` edges, collecting every
/// descendant of the root.
fn collect_epic(store: &dyn BeadStore, root: &BeadId, graph: &mut DepGraph) -> ConvoyResult<()> {
    let mut seen: HashSet<BeadId> = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        graph.insert_bead(store.get(&id).map_err(input_not_found)?);
        let children = store.list_edges(&id, EdgeDirection::Outgoing, &[EdgeClass::ParentChild])?;
        for edge in children {
            if !seen.contains(&edge.to) {
                stack.push(edge.to);
            }
        }
    }
    Ok(())
}

/// Fetch the relation edges of every collected bead. Edges fully inside
/// the set become graph edges; blocking edges that cross the boundary are
/// retained as dangling blockers.
fn load_edges(store: &dyn BeadStore, graph: &mut DepGraph) -> ConvoyResult<()> {
    let ids: Vec<BeadId> = graph.ids_sorted().into_iter().cloned().collect();
    for id in &ids {
        let edges = store.list_edges(id, EdgeDirection::Both, &LOADED_CLASSES)?;
        for edge in edges {
            if graph.contains(&edge.from) && graph.contains(&edge.to) {
                graph.insert_edge(&edge);
            } else if edge.class.is_blocking() {
                graph.insert_dangling(edge);
            }
        }
    }
    Ok(())
}
