//! Minting, refreshing, launching, and closing convoys.

use gastown_core::bead::{BeadKind, BeadPatch, NewBead};
use gastown_core::convoy::ConvoyStatus;
use gastown_core::dispatch::Dispatcher;
use gastown_core::edge::{Edge, EdgeClass};
use gastown_core::identifier::BeadId;
use gastown_core::routing::RoutingTable;
use gastown_core::store::BeadStore;
use itertools::Itertools;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::core::analysis::{analyze, capacity_outlook, Analysis};
use crate::core::graph::{DepGraph, WorkingShape};
use crate::core::waves::{plan_waves, WavePlan};
use crate::core::working_set::{build_graph, WorkingSetSpec};
use crate::report::{build_report, StageReport, StageStatus};
use crate::utils::{input_not_found, ConvoyResult, StageError};

/// Everything a stage invocation produces.
///
/// Error findings do not fail the call: the report is still built so the
/// operator surface can emit it. Use [`StageOutcome::into_result`] when a
/// hard error is wanted instead.
#[derive(Debug)]
pub struct StageOutcome {
    pub convoy_id: Option<BeadId>,
    pub status: StageStatus,
    pub plan: WavePlan,
    pub report: StageReport,
}

impl StageOutcome {
    /// Convert an error-status outcome into the matching [`StageError`].
    pub fn into_result(self) -> ConvoyResult<StageOutcome> {
        if self.status != StageStatus::Error {
            return Ok(self);
        }
        let cycles: Vec<Vec<BeadId>> = self
            .report
            .errors
            .iter()
            .filter(|f| f.kind == crate::core::analysis::FindingKind::Cycle)
            .map(|f| f.ids.clone())
            .collect();
        if !cycles.is_empty() {
            return Err(StageError::Structural { cycles });
        }
        let ids: Vec<BeadId> = self
            .report
            .errors
            .iter()
            .flat_map(|f| f.ids.iter().cloned())
            .collect();
        Err(StageError::Routing { ids })
    }
}

/// The result of dispatching Wave 1 at launch.
#[derive(Debug)]
pub struct LaunchOutcome {
    pub convoy_id: BeadId,
    /// `(bead, pool)` pairs that went out
    pub dispatched: Vec<(BeadId, String)>,
    /// Per-bead failures; the feeder retries these on its next tick
    pub failed: Vec<(BeadId, String)>,
}

/// Stage a working set: validate, layer, and mint or refresh a convoy.
///
/// A new convoy is created for epic and list shapes; convoy shape (or an
/// explicit `reuse`) updates the existing record in place, preserving its
/// id and creation time.
pub fn stage(
    store: &dyn BeadStore,
    routes: &dyn RoutingTable,
    spec: &WorkingSetSpec,
    reuse: Option<&BeadId>,
) -> ConvoyResult<StageOutcome> {
    let graph = build_graph(store, spec)?;
    let analysis = analyze(&graph, routes);

    if analysis.has_errors() {
        info!(
            "stage refused: {} error finding(s), no convoy minted",
            analysis.errors().count()
        );
        let plan = WavePlan::default();
        let report = build_report(&graph, &plan, &analysis, &[], None, StageStatus::Error);
        return Ok(StageOutcome {
            convoy_id: None,
            status: StageStatus::Error,
            plan,
            report,
        });
    }

    let plan = plan_waves(&graph)?;
    if plan.is_empty() {
        return Err(StageError::Input("nothing to schedule".to_string()));
    }

    let outlook = capacity_outlook(&plan, &analysis.pools, routes);

    let status = if analysis.has_status_warnings() {
        StageStatus::StagedWarnings
    } else {
        StageStatus::StagedReady
    };
    let convoy_status = match status {
        StageStatus::StagedReady => ConvoyStatus::StagedReady,
        _ => ConvoyStatus::StagedWarnings,
    };

    let notes = render_notes(&graph, &plan, &analysis);
    let reuse = reuse.or_else(|| spec.reuse_convoy());
    let convoy_id = match reuse {
        Some(id) => refresh_convoy(store, id, convoy_status, notes)?,
        None => mint_convoy(store, &graph, convoy_status, notes)?,
    };

    bind_tracked(store, &convoy_id, &plan)?;

    debug!(
        "staged convoy {} ({} beads across {} waves, {})",
        convoy_id,
        plan.bead_count(),
        plan.len(),
        convoy_status
    );

    let report = build_report(
        &graph,
        &plan,
        &analysis,
        &outlook,
        Some(convoy_id.clone()),
        status,
    );
    Ok(StageOutcome {
        convoy_id: Some(convoy_id),
        status,
        plan,
        report,
    })
}

/// Launch a staged convoy: flip it open and dispatch Wave 1.
///
/// Launching from `staged_warnings` requires `force`; the refusal carries
/// the stored warning summary. Subsequent waves are never dispatched here,
/// that is the feeder's job.
pub fn launch(
    store: &dyn BeadStore,
    routes: &dyn RoutingTable,
    dispatcher: &dyn Dispatcher,
    convoy_id: &BeadId,
    force: bool,
) -> ConvoyResult<LaunchOutcome> {
    let convoy = store.get(convoy_id).map_err(input_not_found)?;
    if convoy.kind != BeadKind::Convoy {
        return Err(StageError::Input(format!(
            "{} is a {}, not a convoy",
            convoy.id, convoy.kind
        )));
    }
    let status = ConvoyStatus::try_from(convoy.status)
        .map_err(|e| StageError::Input(e.to_string()))?;

    if !status.may_transition(ConvoyStatus::Open) {
        return Err(StageError::Transition {
            convoy: convoy.id.clone(),
            status: status.to_string(),
            action: "launch".to_string(),
            warnings: Vec::new(),
        });
    }
    if status.launch_needs_force() && !force {
        return Err(StageError::Transition {
            convoy: convoy.id.clone(),
            status: status.to_string(),
            action: "launch without --force".to_string(),
            warnings: stored_warnings(&convoy.body),
        });
    }

    let graph = build_graph(store, &WorkingSetSpec::Convoy(convoy_id.clone()))?;
    let plan = plan_waves(&graph)?;

    store.update(convoy_id, BeadPatch::status(ConvoyStatus::Open.into()))?;
    info!("convoy {} is open", convoy_id);

    let mut outcome = LaunchOutcome {
        convoy_id: convoy_id.clone(),
        dispatched: Vec::new(),
        failed: Vec::new(),
    };

    for id in plan.first_wave() {
        let Some(bead) = graph.bead(id) else { continue };
        if bead.status.is_closed() || bead.assignee.is_some() {
            continue;
        }
        let Some(pool) = routes.resolve_pool(id.prefix()) else {
            warn!("{} no longer routes to any pool, leaving for the feeder", id);
            outcome
                .failed
                .push((id.clone(), "no valid routing".to_string()));
            continue;
        };
        match dispatcher.dispatch(bead, &pool) {
            Ok(()) => {
                if let Err(e) = store.update(id, BeadPatch::assign(pool.clone())) {
                    warn!("dispatched {} but could not record assignment: {}", id, e);
                }
                outcome.dispatched.push((id.clone(), pool));
            }
            Err(e) => {
                warn!("dispatch of {} failed: {}", id, e);
                outcome.failed.push((id.clone(), e.to_string()));
            }
        }
    }

    Ok(outcome)
}

/// Close an open convoy, recording the reason.
pub fn close(store: &dyn BeadStore, convoy_id: &BeadId, reason: &str) -> ConvoyResult<()> {
    let convoy = store.get(convoy_id).map_err(input_not_found)?;
    let status = ConvoyStatus::try_from(convoy.status)
        .map_err(|e| StageError::Input(e.to_string()))?;
    if !status.may_transition(ConvoyStatus::Closed) {
        return Err(StageError::Transition {
            convoy: convoy.id,
            status: status.to_string(),
            action: "close".to_string(),
            warnings: Vec::new(),
        });
    }
    store.close(convoy_id, reason)?;
    info!("convoy {} closed: {}", convoy_id, reason);
    Ok(())
}

fn mint_convoy(
    store: &dyn BeadStore,
    graph: &DepGraph,
    status: ConvoyStatus,
    notes: String,
) -> ConvoyResult<BeadId> {
    let title = match graph.shape() {
        WorkingShape::Epic(root) => {
            let epic_title = graph
                .bead(root)
                .map(|bead| bead.title.clone())
                .unwrap_or_else(|| root.to_string());
            format!("Convoy: {}", epic_title)
        }
        _ => format!("Convoy: {} beads", graph.schedulable().len()),
    };
    let convoy = store.create(
        NewBead::new(BeadKind::Convoy, title)
            .with_status(status.into())
            .with_body(notes),
    )?;
    Ok(convoy.id)
}

fn refresh_convoy(
    store: &dyn BeadStore,
    id: &BeadId,
    status: ConvoyStatus,
    notes: String,
) -> ConvoyResult<BeadId> {
    let convoy = store.get(id).map_err(input_not_found)?;
    if convoy.kind != BeadKind::Convoy {
        return Err(StageError::Input(format!(
            "{} is a {}, not a convoy",
            convoy.id, convoy.kind
        )));
    }
    let current = ConvoyStatus::try_from(convoy.status)
        .map_err(|e| StageError::Input(e.to_string()))?;
    if !current.may_transition(status) {
        return Err(StageError::Transition {
            convoy: convoy.id,
            status: current.to_string(),
            action: "re-stage".to_string(),
            warnings: Vec::new(),
        });
    }
    store.update(
        id,
        BeadPatch::status(status.into()).with_body(notes),
    )?;
    Ok(id.clone())
}

/// Bind the scheduled beads to the convoy with `tracks` edges.
///
/// Additive and idempotent: existing edges are left alone, failures are
/// logged per edge. The convoy stands as long as at least one edge holds.
fn bind_tracked(store: &dyn BeadStore, convoy_id: &BeadId, plan: &WavePlan) -> ConvoyResult<()> {
    let mut bound = 0usize;
    let mut last_err = None;
    for id in plan.iter() {
        let edge = Edge::new(convoy_id.clone(), id.clone(), EdgeClass::Tracks);
        match store.add_edge(edge) {
            Ok(()) => bound += 1,
            Err(e) => {
                warn!("could not track {} under {}: {}", id, convoy_id, e);
                last_err = Some(e);
            }
        }
    }
    if bound == 0 {
        if let Some(e) = last_err {
            return Err(StageError::Store(e));
        }
    }
    Ok(())
}

/// The notes kept in the convoy bead's body: staging timestamp, counts,
/// and the warning summary.
fn render_notes(graph: &DepGraph, plan: &WavePlan, analysis: &Analysis) -> String {
    let ts = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let mut notes = format!(
        "staged {} | {} beads | {} waves | set of {}",
        ts,
        plan.bead_count(),
        plan.len(),
        graph.len()
    );
    let warnings: Vec<String> = analysis.warnings().map(|f| f.summary()).collect();
    if !warnings.is_empty() {
        notes.push_str("\nwarnings:\n");
        notes.push_str(&warnings.iter().map(|w| format!("- {w}")).join("\n"));
    }
    notes
}

/// Pull the warning summary back out of a convoy's notes.
fn stored_warnings(body: &str) -> Vec<String> {
    body.lines()
        .skip_while(|line| line.trim() != "warnings:")
        .skip(1)
        .filter_map(|line| line.strip_prefix("- ").map(str::to_string))
        .collect()
}
