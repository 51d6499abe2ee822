//! Command-level operations tying the planner together.

use std::fmt::Write as _;

use colored::Colorize;
use gastown_core::bead::{BeadKind, BeadStatus};
use gastown_core::convoy::ConvoyStatus;
use gastown_core::dispatch::Dispatcher;
use gastown_core::identifier::BeadId;
use gastown_core::routing::RoutingTable;
use gastown_core::store::BeadStore;

use crate::cli::{LaunchArgs, StageArgs, StatusArgs};
use crate::core::manager::{launch, stage, LaunchOutcome, StageOutcome};
use crate::core::waves::plan_waves;
use crate::core::working_set::{build_graph, WorkingSetSpec};
use crate::report::StageStatus;
use crate::utils::{input_not_found, ConvoyResult, StageError};

/// The result of a `stage` command: the stage outcome plus the launch
/// result when `--launch` was given and staging succeeded.
pub struct StageRun {
    pub outcome: StageOutcome,
    pub launch: Option<LaunchOutcome>,
}

/// Run the `stage` command.
pub fn run_stage(
    store: &dyn BeadStore,
    routes: &dyn RoutingTable,
    dispatcher: &dyn Dispatcher,
    args: &StageArgs,
) -> ConvoyResult<StageRun> {
    let spec = WorkingSetSpec::infer(store, &args.inputs)?;
    let reuse = args
        .reuse
        .as_deref()
        .map(|raw| raw.parse::<BeadId>())
        .transpose()?;

    let outcome = stage(store, routes, &spec, reuse.as_ref())?;

    let launched = if args.launch && outcome.status != StageStatus::Error {
        let convoy_id = outcome
            .convoy_id
            .clone()
            .expect("non-error stages always mint a convoy");
        Some(launch(store, routes, dispatcher, &convoy_id, args.force)?)
    } else {
        None
    };

    Ok(StageRun {
        outcome,
        launch: launched,
    })
}

/// Run the `launch` command.
///
/// Equivalent to `stage <convoy-id> --launch`, except that a convoy
/// already staged clean skips re-analysis. Refuses on `open` and `closed`.
pub fn run_launch(
    store: &dyn BeadStore,
    routes: &dyn RoutingTable,
    dispatcher: &dyn Dispatcher,
    args: &LaunchArgs,
) -> ConvoyResult<LaunchOutcome> {
    let convoy_id: BeadId = args.convoy_id.parse()?;
    let convoy = store.get(&convoy_id).map_err(input_not_found)?;
    let status = ConvoyStatus::try_from(convoy.status)
        .map_err(|e| StageError::Input(e.to_string()))?;

    if status == ConvoyStatus::StagedWarnings {
        // warnings may have cleared (or worsened) since staging
        let outcome = stage(
            store,
            routes,
            &WorkingSetSpec::Convoy(convoy_id.clone()),
            None,
        )?
        .into_result()?;
        debug!(
            "re-staged {} before launch: {:?}",
            convoy_id, outcome.status
        );
    }

    launch(store, routes, dispatcher, &convoy_id, args.force)
}

/// A convoy's progress through its waves.
#[derive(Debug, Serialize)]
pub struct ConvoyProgress {
    pub convoy_id: BeadId,
    pub title: String,
    pub status: BeadStatus,
    pub total: usize,
    pub closed: usize,
    pub waves: Vec<ProgressWave>,
}

#[derive(Debug, Serialize)]
pub struct ProgressWave {
    pub wave: usize,
    pub total: usize,
    pub closed: usize,
    pub items: Vec<ProgressItem>,
}

#[derive(Debug, Serialize)]
pub struct ProgressItem {
    pub id: BeadId,
    pub title: String,
    pub status: BeadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

/// Run the `status` command: read-only view of a convoy's waves.
pub fn run_status(store: &dyn BeadStore, args: &StatusArgs) -> ConvoyResult<ConvoyProgress> {
    let convoy_id: BeadId = args.convoy_id.parse()?;
    let convoy = store.get(&convoy_id).map_err(input_not_found)?;
    if convoy.kind != BeadKind::Convoy {
        return Err(StageError::Input(format!(
            "{} is a {}, not a convoy",
            convoy.id, convoy.kind
        )));
    }

    let graph = build_graph(store, &WorkingSetSpec::Convoy(convoy_id.clone()))?;
    let plan = plan_waves(&graph)?;

    let mut total = 0usize;
    let mut closed_total = 0usize;
    let mut waves = Vec::new();
    for (index, wave) in plan.waves().iter().enumerate() {
        let mut items = Vec::new();
        let mut closed = 0usize;
        for id in wave {
            let Some(bead) = graph.bead(id) else { continue };
            if bead.status.is_closed() {
                closed += 1;
            }
            items.push(ProgressItem {
                id: bead.id.clone(),
                title: bead.title.clone(),
                status: bead.status,
                assignee: bead.assignee.clone(),
            });
        }
        total += items.len();
        closed_total += closed;
        waves.push(ProgressWave {
            wave: index + 1,
            total: items.len(),
            closed,
            items,
        });
    }

    Ok(ConvoyProgress {
        convoy_id,
        title: convoy.title,
        status: convoy.status,
        total,
        closed: closed_total,
        waves,
    })
}

/// Render a progress view for a terminal.
pub fn render_progress(progress: &ConvoyProgress) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({})",
        progress.convoy_id.to_string().bold(),
        progress.title,
        progress.status
    );
    for wave in &progress.waves {
        let _ = writeln!(
            out,
            "Wave {}: {}/{} closed",
            wave.wave, wave.closed, wave.total
        );
        for item in &wave.items {
            let marker = match item.status {
                BeadStatus::Closed => "v",
                BeadStatus::InProgress => "~",
                _ => "o",
            };
            let assignee = item
                .assignee
                .as_deref()
                .map(|a| format!("  [{a}]"))
                .unwrap_or_default();
            let _ = writeln!(out, "  {}  {}  {}{}", marker, item.id, item.title, assignee);
        }
    }
    let _ = writeln!(
        out,
        "Overall: {}/{} closed",
        progress.closed, progress.total
    );
    out
}

/// Render a launch outcome for a terminal.
pub fn render_launch(outcome: &LaunchOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "convoy {} launched, {} bead(s) dispatched",
        outcome.convoy_id,
        outcome.dispatched.len()
    );
    for (id, pool) in &outcome.dispatched {
        let _ = writeln!(out, "  o  {}  -> {}", id, pool.cyan());
    }
    for (id, error) in &outcome.failed {
        let _ = writeln!(out, "  x  {}  {}", id, error.red());
    }
    out
}
