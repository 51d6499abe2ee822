//! Wave layering of the schedulable subgraph.

use std::collections::BTreeMap;

use gastown_core::identifier::BeadId;

use crate::core::graph::DepGraph;
use crate::utils::{ConvoyResult, StageError};

/// An ordered sequence of disjoint waves covering every schedulable bead
/// exactly once. Wave 1 holds the beads with no unsatisfied blocker inside
/// the set; beads within a wave are sorted lexically.
///
/// The wave numbers are an ordering-safe upper bound on parallelism, not a
/// runtime schedule: the feeder follows the store's live blocker view.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct WavePlan {
    waves: Vec<Vec<BeadId>>,
}

impl WavePlan {
    pub fn waves(&self) -> &[Vec<BeadId>] {
        &self.waves
    }

    /// Number of waves.
    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// Total number of beads across all waves.
    pub fn bead_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    /// The 1-based wave this bead landed in.
    pub fn wave_of(&self, id: &BeadId) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.contains(id))
            .map(|index| index + 1)
    }

    /// Wave 1, empty slice if there is nothing to schedule.
    pub fn first_wave(&self) -> &[BeadId] {
        self.waves.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every scheduled bead, wave by wave.
    pub fn iter(&self) -> impl Iterator<Item = &BeadId> {
        self.waves.iter().flatten()
    }
}

/// Kahn's algorithm over the blocking subgraph of the schedulable beads.
///
/// Edges from already-closed blockers count as satisfied. Dangling
/// blockers (outside the working set) contribute no in-degree, so their
/// dependents land in Wave 1; the feeder still respects the store's live
/// blocker view before dispatching them.
///
/// Leftover beads with nonzero in-degree mean a cycle slipped past the
/// analyzer; that is an internal invariant violation, reported as a
/// structural error.
pub fn plan_waves(graph: &DepGraph) -> ConvoyResult<WavePlan> {
    let schedulable = graph.schedulable();

    let mut in_degree: BTreeMap<&BeadId, usize> = BTreeMap::new();
    for bead in &schedulable {
        in_degree.insert(&bead.id, 0);
    }
    for bead in &schedulable {
        if bead.status.is_closed() {
            continue;
        }
        for succ in graph.blocking_successors(&bead.id) {
            if let Some(degree) = in_degree.get_mut(succ) {
                *degree += 1;
            }
        }
    }

    let mut waves: Vec<Vec<BeadId>> = Vec::new();
    while !in_degree.is_empty() {
        // BTreeMap iteration keeps each wave in lexical order
        let ready: Vec<BeadId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| (*id).clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in &ready {
            in_degree.remove(id);
            let closed = graph
                .bead(id)
                .map(|bead| bead.status.is_closed())
                .unwrap_or(false);
            if closed {
                // this bead's edges were never counted
                continue;
            }
            for succ in graph.blocking_successors(id) {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                }
            }
        }
        waves.push(ready);
    }

    if !in_degree.is_empty() {
        let leftover: Vec<BeadId> = in_degree.keys().map(|id| (*id).clone()).collect();
        error!(
            "wave layering stalled on {} beads; a blocking cycle escaped analysis",
            leftover.len()
        );
        return Err(StageError::Structural {
            cycles: vec![leftover],
        });
    }

    Ok(WavePlan { waves })
}
