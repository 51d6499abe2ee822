//! Structural analysis of a working set: cycles, routing, warnings.

use std::collections::{BTreeMap, HashMap};

use gastown_core::bead::BeadKind;
use gastown_core::identifier::BeadId;
use gastown_core::routing::RoutingTable;
use itertools::Itertools;

use crate::core::graph::{DepGraph, WorkingShape};
use crate::core::waves::WavePlan;

/// How a finding weighs on the stage decision.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    /// Blocks staging entirely
    Error,
    /// Allows staging, demands acknowledgement at launch
    Warning,
    /// Surfaced in the report, never changes the status
    Info,
}

/// The kinds of findings the analyzer can raise.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FindingKind {
    Cycle,
    NoRouting,
    Orphan,
    ParkedPool,
    MissingIntegrationBranch,
    RoutingMismatch,
    CapacityOutlook,
}

impl FindingKind {
    pub fn severity(&self) -> Severity {
        match self {
            FindingKind::Cycle | FindingKind::NoRouting => Severity::Error,
            FindingKind::CapacityOutlook => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

/// One analyzer finding, ready for the stage report.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub ids: Vec<BeadId>,
    pub detail: String,
}

impl Finding {
    fn new(kind: FindingKind, ids: Vec<BeadId>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            ids,
            detail: detail.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// One line for the convoy notes and launch refusals.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} ({})",
            self.kind,
            self.detail,
            self.ids.iter().join(", ")
        )
    }
}

/// The analyzer's verdict over one working set.
pub struct Analysis {
    pub findings: Vec<Finding>,
    /// Resolved pool per schedulable bead; beads with no routing are absent
    pub pools: BTreeMap<BeadId, String>,
}

impl Analysis {
    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity() == Severity::Error)
    }

    /// Warning- and info-severity findings, in detection order.
    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity() != Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Whether any finding demotes the stage to `staged_warnings`.
    /// Info findings do not.
    pub fn has_status_warnings(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity() == Severity::Warning)
    }

    /// The cycles found, for the structural error.
    pub fn cycles(&self) -> Vec<Vec<BeadId>> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::Cycle)
            .map(|f| f.ids.clone())
            .collect()
    }

    /// The beads with no valid routing, for the routing error.
    pub fn unroutable(&self) -> Vec<BeadId> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::NoRouting)
            .flat_map(|f| f.ids.iter().cloned())
            .collect()
    }
}

/// Run cycle detection, routing resolution, and warning detection over a
/// working set.
pub fn analyze(graph: &DepGraph, routes: &dyn RoutingTable) -> Analysis {
    let mut findings = Vec::new();

    for cycle in find_cycles(graph) {
        let detail = format!("blocking cycle {}", cycle.iter().join(" -> "));
        findings.push(Finding::new(FindingKind::Cycle, cycle, detail));
    }

    let (pools, routing_findings) = resolve_routing(graph, routes);
    findings.extend(routing_findings);

    if let WorkingShape::Epic(_) = graph.shape() {
        let orphans: Vec<BeadId> = graph
            .schedulable()
            .into_iter()
            .filter(|bead| !graph.has_blocking_contact(&bead.id))
            .map(|bead| bead.id.clone())
            .collect();
        if !orphans.is_empty() {
            findings.push(Finding::new(
                FindingKind::Orphan,
                orphans,
                "no blocking relation to any other bead in the set",
            ));
        }
    }

    let unbranched: Vec<BeadId> = graph
        .beads()
        .filter(|bead| bead.kind == BeadKind::SubEpic && bead.needs_integration_branch)
        .map(|bead| bead.id.clone())
        .collect();
    if !unbranched.is_empty() {
        findings.push(Finding::new(
            FindingKind::MissingIntegrationBranch,
            unbranched,
            "sub-epic has no integration branch",
        ));
    }

    Analysis { findings, pools }
}

/// Resolve every schedulable bead's pool and collect routing findings.
fn resolve_routing(
    graph: &DepGraph,
    routes: &dyn RoutingTable,
) -> (BTreeMap<BeadId, String>, Vec<Finding>) {
    let mut pools = BTreeMap::new();
    let mut findings = Vec::new();
    let mut unroutable: BTreeMap<String, Vec<BeadId>> = BTreeMap::new();
    let mut parked: BTreeMap<String, Vec<BeadId>> = BTreeMap::new();

    for bead in graph.schedulable() {
        let prefix = bead.id.prefix();
        match routes.resolve_pool(prefix) {
            None => {
                unroutable
                    .entry(prefix.to_string())
                    .or_default()
                    .push(bead.id.clone());
            }
            Some(pool) => {
                if let Some(expected) = bead.expected_pool() {
                    if expected != pool {
                        findings.push(Finding::new(
                            FindingKind::RoutingMismatch,
                            vec![bead.id.clone()],
                            format!("declared pool {} but routes to {}", expected, pool),
                        ));
                    }
                }
                if routes.pool_is_parked(&pool) {
                    parked.entry(pool.clone()).or_default().push(bead.id.clone());
                }
                pools.insert(bead.id.clone(), pool);
            }
        }
    }

    for (prefix, ids) in unroutable {
        findings.push(Finding::new(
            FindingKind::NoRouting,
            ids,
            format!("no pool routes prefix '{}'", prefix),
        ));
    }
    for (pool, ids) in parked {
        findings.push(Finding::new(
            FindingKind::ParkedPool,
            ids,
            format!("pool {} is parked", pool),
        ));
    }

    (pools, findings)
}

/// The maximum parallel demand each wave places on a pool, compared with
/// the pool's declared capacity. Informational only.
pub fn capacity_outlook(
    plan: &WavePlan,
    pools: &BTreeMap<BeadId, String>,
    routes: &dyn RoutingTable,
) -> Vec<Finding> {
    let mut peak: BTreeMap<&str, (usize, usize)> = BTreeMap::new(); // pool -> (demand, wave)
    for (index, wave) in plan.waves().iter().enumerate() {
        let mut per_pool: BTreeMap<&str, usize> = BTreeMap::new();
        for id in wave {
            if let Some(pool) = pools.get(id) {
                *per_pool.entry(pool.as_str()).or_default() += 1;
            }
        }
        for (pool, demand) in per_pool {
            let entry = peak.entry(pool).or_insert((0, 0));
            if demand > entry.0 {
                *entry = (demand, index + 1);
            }
        }
    }

    let mut findings = Vec::new();
    for (pool, (demand, wave)) in peak {
        if let Some((_, max)) = routes.pool_capacity(pool) {
            if demand > max {
                findings.push(Finding::new(
                    FindingKind::CapacityOutlook,
                    Vec::new(),
                    format!(
                        "wave {} asks {} workers of pool {} (capacity {})",
                        wave, demand, pool, max
                    ),
                ));
            }
        }
    }
    findings
}

/// Find every cycle in the blocking subgraph.
///
/// Three-color depth-first search; a back edge to an on-stack bead yields
/// one cycle, reconstructed from the DFS path (closing bead repeated).
/// Roots are visited in id order so reports are reproducible. Self-loops
/// come out as cycles of length 1, e.g. `[a, a]`.
pub fn find_cycles(graph: &DepGraph) -> Vec<Vec<BeadId>> {
    #[derive(Copy, Clone, Eq, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn visit(
        graph: &DepGraph,
        id: &BeadId,
        colors: &mut HashMap<BeadId, Color>,
        path: &mut Vec<BeadId>,
        cycles: &mut Vec<Vec<BeadId>>,
    ) {
        colors.insert(id.clone(), Color::Gray);
        path.push(id.clone());

        for next in graph.blocking_successors(id) {
            match colors.get(next).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let start = path
                        .iter()
                        .position(|p| p == next)
                        .expect("gray beads are always on the path");
                    let mut cycle: Vec<BeadId> = path[start..].to_vec();
                    cycle.push(next.clone());
                    cycles.push(cycle);
                }
                Color::White => visit(graph, next, colors, path, cycles),
                Color::Black => {}
            }
        }

        path.pop();
        colors.insert(id.clone(), Color::Black);
    }

    let mut colors: HashMap<BeadId, Color> = HashMap::new();
    let mut cycles = Vec::new();
    let mut path = Vec::new();
    for id in graph.ids_sorted() {
        if colors.get(id).copied().unwrap_or(Color::White) == Color::White {
            visit(graph, id, &mut colors, &mut path, &mut cycles);
        }
    }
    cycles
}
