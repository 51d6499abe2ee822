//! End-to-end staging and launching against an in-memory store.

use std::sync::Mutex;

use gastown_convoy::core::analysis::FindingKind;
use gastown_convoy::core::manager::{launch, stage};
use gastown_convoy::core::working_set::WorkingSetSpec;
use gastown_convoy::report::StageStatus;
use gastown_convoy::StageError;
use gastown_core::bead::{Bead, BeadKind, BeadStatus, NewBead};
use gastown_core::convoy::ConvoyStatus;
use gastown_core::dispatch::{DispatchError, Dispatcher};
use gastown_core::edge::{Edge, EdgeClass, EdgeDirection};
use gastown_core::identifier::BeadId;
use gastown_core::routing::{PoolConfig, StaticRoutes};
use gastown_core::store::{BeadStore, MemoryStore};

#[derive(Default)]
struct RecordingDispatcher {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingDispatcher {
    fn dispatched(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, bead: &Bead, pool: &str) -> Result<(), DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((bead.id.to_string(), pool.to_string()));
        Ok(())
    }
}

fn seed(store: &MemoryStore, id: &str, kind: BeadKind) {
    store
        .create(NewBead::new(kind, format!("bead {id}")).with_id(id.parse().unwrap()))
        .unwrap();
}

fn link(store: &MemoryStore, from: &str, to: &str, class: EdgeClass) {
    store
        .add_edge(Edge::new(from.parse().unwrap(), to.parse().unwrap(), class))
        .unwrap();
}

fn routes() -> StaticRoutes {
    StaticRoutes::new()
        .with_route("x", "polecats")
        .with_route("g", "polecats")
        .with_route("t", "polecats")
        .with_route("p", "refinery")
}

fn list_spec(ids: &[&str]) -> WorkingSetSpec {
    WorkingSetSpec::List(ids.iter().map(|id| id.parse().unwrap()).collect())
}

fn wave_strs(outcome: &gastown_convoy::StageOutcome) -> Vec<Vec<String>> {
    outcome
        .plan
        .waves()
        .iter()
        .map(|wave| wave.iter().map(|id| id.to_string()).collect())
        .collect()
}

#[test]
fn linear_chain_stages_and_launches_wave_one() {
    let store = MemoryStore::new();
    for id in ["x-1", "x-2", "x-3"] {
        seed(&store, id, BeadKind::Task);
    }
    link(&store, "x-1", "x-2", EdgeClass::Blocks);
    link(&store, "x-2", "x-3", EdgeClass::Blocks);

    let outcome = stage(&store, &routes(), &list_spec(&["x-1", "x-2", "x-3"]), None).unwrap();
    assert_eq!(outcome.status, StageStatus::StagedReady);
    assert_eq!(
        wave_strs(&outcome),
        vec![vec!["x-1"], vec!["x-2"], vec!["x-3"]]
    );

    let convoy_id = outcome.convoy_id.unwrap();
    let convoy = store.get(&convoy_id).unwrap();
    assert_eq!(convoy.status, BeadStatus::from(ConvoyStatus::StagedReady));
    assert!(convoy.body.contains("3 beads"));
    assert!(convoy.body.contains("3 waves"));

    let dispatcher = RecordingDispatcher::default();
    let launched = launch(&store, &routes(), &dispatcher, &convoy_id, false).unwrap();
    assert_eq!(
        dispatcher.dispatched(),
        vec![("x-1".to_string(), "polecats".to_string())]
    );
    assert_eq!(launched.dispatched.len(), 1);
    assert!(launched.failed.is_empty());

    let convoy = store.get(&convoy_id).unwrap();
    assert_eq!(convoy.status, BeadStatus::from(ConvoyStatus::Open));
    let x1 = store.get(&"x-1".parse().unwrap()).unwrap();
    assert_eq!(x1.assignee.as_deref(), Some("polecats"));
    let x2 = store.get(&"x-2".parse().unwrap()).unwrap();
    assert!(x2.assignee.is_none());
}

#[test]
fn diamond_layers_into_three_waves() {
    let store = MemoryStore::new();
    for id in ["g-a", "g-b", "g-c", "g-d"] {
        seed(&store, id, BeadKind::Task);
    }
    link(&store, "g-a", "g-b", EdgeClass::Blocks);
    link(&store, "g-a", "g-c", EdgeClass::Blocks);
    link(&store, "g-b", "g-d", EdgeClass::Blocks);
    link(&store, "g-c", "g-d", EdgeClass::Blocks);

    let outcome = stage(
        &store,
        &routes(),
        &list_spec(&["g-a", "g-b", "g-c", "g-d"]),
        None,
    )
    .unwrap();
    assert_eq!(
        wave_strs(&outcome),
        vec![vec!["g-a"], vec!["g-b", "g-c"], vec!["g-d"]]
    );
}

#[test]
fn self_loop_refuses_staging() {
    let store = MemoryStore::new();
    seed(&store, "p-1", BeadKind::Task);
    link(&store, "p-1", "p-1", EdgeClass::Blocks);

    let outcome = stage(&store, &routes(), &list_spec(&["p-1"]), None).unwrap();
    assert_eq!(outcome.status, StageStatus::Error);
    assert!(outcome.convoy_id.is_none());
    let cycle = &outcome.report.errors[0];
    assert_eq!(cycle.kind, FindingKind::Cycle);
    let ids: Vec<_> = cycle.ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["p-1", "p-1"]);

    // no convoy record was created
    assert!(store
        .list_by_kind(BeadKind::Convoy, None)
        .unwrap()
        .is_empty());

    // and the hard-error view names the cycle
    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, StageError::Structural { .. }));
}

#[test]
fn back_edge_reports_the_cycle_path() {
    let store = MemoryStore::new();
    for id in ["g-a", "g-b", "g-c"] {
        seed(&store, id, BeadKind::Task);
    }
    link(&store, "g-a", "g-b", EdgeClass::Blocks);
    link(&store, "g-b", "g-c", EdgeClass::Blocks);
    link(&store, "g-c", "g-a", EdgeClass::Blocks);

    let outcome = stage(&store, &routes(), &list_spec(&["g-a", "g-b", "g-c"]), None).unwrap();
    assert_eq!(outcome.status, StageStatus::Error);
    let ids: Vec<_> = outcome.report.errors[0]
        .ids
        .iter()
        .map(|id| id.as_str())
        .collect();
    assert_eq!(ids, vec!["g-a", "g-b", "g-c", "g-a"]);
}

#[test]
fn parent_child_edges_do_not_order_waves() {
    let store = MemoryStore::new();
    seed(&store, "ep-1", BeadKind::Epic);
    seed(&store, "t-1", BeadKind::Task);
    seed(&store, "t-2", BeadKind::Task);
    link(&store, "ep-1", "t-1", EdgeClass::ParentChild);
    link(&store, "ep-1", "t-2", EdgeClass::ParentChild);

    let spec = WorkingSetSpec::Epic("ep-1".parse().unwrap());
    let outcome = stage(&store, &routes(), &spec, None).unwrap();
    assert_eq!(wave_strs(&outcome), vec![vec!["t-1", "t-2"]]);

    // with no blocking edges at all, both children are orphans of the epic
    assert_eq!(outcome.status, StageStatus::StagedWarnings);

    let convoy_id = outcome.convoy_id.unwrap();
    let dispatcher = RecordingDispatcher::default();
    launch(&store, &routes(), &dispatcher, &convoy_id, true).unwrap();
    let dispatched: Vec<_> = dispatcher.dispatched().into_iter().map(|(id, _)| id).collect();
    assert_eq!(dispatched, vec!["t-1", "t-2"]);
}

#[test]
fn parked_pool_stages_with_warnings_and_needs_force() {
    let store = MemoryStore::new();
    seed(&store, "p-1", BeadKind::Task);
    let table = routes().park("refinery");

    let outcome = stage(&store, &table, &list_spec(&["p-1"]), None).unwrap();
    assert_eq!(outcome.status, StageStatus::StagedWarnings);
    let convoy_id = outcome.convoy_id.unwrap();
    let convoy = store.get(&convoy_id).unwrap();
    assert_eq!(convoy.status, BeadStatus::from(ConvoyStatus::StagedWarnings));
    assert!(convoy.body.contains("parked_pool"));

    let dispatcher = RecordingDispatcher::default();
    let err = launch(&store, &table, &dispatcher, &convoy_id, false).unwrap_err();
    match err {
        StageError::Transition { warnings, .. } => {
            assert!(!warnings.is_empty(), "refusal should carry the summary")
        }
        other => panic!("expected transition error, got {other}"),
    }
    assert!(dispatcher.dispatched().is_empty());

    launch(&store, &table, &dispatcher, &convoy_id, true).unwrap();
    assert_eq!(
        store.get(&convoy_id).unwrap().status,
        BeadStatus::from(ConvoyStatus::Open)
    );
    assert_eq!(dispatcher.dispatched().len(), 1);
}

#[test]
fn restage_updates_the_convoy_in_place() {
    let store = MemoryStore::new();
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);

    let first = stage(&store, &routes(), &list_spec(&["x-1", "x-2"]), None).unwrap();
    let convoy_id = first.convoy_id.unwrap();
    assert_eq!(first.plan.len(), 1);
    let created_at = store.get(&convoy_id).unwrap().created_at;

    link(&store, "x-1", "x-2", EdgeClass::Blocks);

    let second = stage(
        &store,
        &routes(),
        &WorkingSetSpec::Convoy(convoy_id.clone()),
        None,
    )
    .unwrap();
    assert_eq!(second.convoy_id.as_ref(), Some(&convoy_id));
    assert_eq!(second.plan.len(), 2, "new edge adds a wave");

    let convoys = store.list_by_kind(BeadKind::Convoy, None).unwrap();
    assert_eq!(convoys.len(), 1, "no duplicate convoy record");
    assert_eq!(convoys[0].created_at, created_at);
}

#[test]
fn restage_is_idempotent_on_tracks_edges() {
    let store = MemoryStore::new();
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);

    let first = stage(&store, &routes(), &list_spec(&["x-1", "x-2"]), None).unwrap();
    let convoy_id = first.convoy_id.unwrap();
    let tracks_before = store
        .list_edges(&convoy_id, EdgeDirection::Outgoing, &[EdgeClass::Tracks])
        .unwrap();

    let second = stage(
        &store,
        &routes(),
        &WorkingSetSpec::Convoy(convoy_id.clone()),
        None,
    )
    .unwrap();
    assert_eq!(second.status, first.status);

    let tracks_after = store
        .list_edges(&convoy_id, EdgeDirection::Outgoing, &[EdgeClass::Tracks])
        .unwrap();
    assert_eq!(tracks_before, tracks_after);
}

#[test]
fn stage_read_back_yields_the_same_partition() {
    let store = MemoryStore::new();
    for id in ["g-a", "g-b", "g-c", "g-d"] {
        seed(&store, id, BeadKind::Task);
    }
    link(&store, "g-a", "g-b", EdgeClass::Blocks);
    link(&store, "g-b", "g-d", EdgeClass::WaitsFor);
    link(&store, "g-a", "g-c", EdgeClass::ConditionalBlocks);

    let first = stage(
        &store,
        &routes(),
        &list_spec(&["g-a", "g-b", "g-c", "g-d"]),
        None,
    )
    .unwrap();
    let convoy_id = first.convoy_id.clone().unwrap();

    let second = stage(&store, &routes(), &WorkingSetSpec::Convoy(convoy_id), None).unwrap();
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.status, second.status);
}

#[test]
fn launch_is_one_shot() {
    let store = MemoryStore::new();
    seed(&store, "x-1", BeadKind::Task);
    let outcome = stage(&store, &routes(), &list_spec(&["x-1"]), None).unwrap();
    let convoy_id = outcome.convoy_id.unwrap();

    let dispatcher = RecordingDispatcher::default();
    launch(&store, &routes(), &dispatcher, &convoy_id, false).unwrap();
    let err = launch(&store, &routes(), &dispatcher, &convoy_id, false).unwrap_err();
    assert!(matches!(err, StageError::Transition { .. }));
    assert_eq!(dispatcher.dispatched().len(), 1);
}

#[test]
fn dangling_blockers_do_not_hold_back_wave_one() {
    let store = MemoryStore::new();
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    seed(&store, "out-1", BeadKind::Task);
    link(&store, "out-1", "x-1", EdgeClass::Blocks);
    link(&store, "x-1", "x-2", EdgeClass::Blocks);

    let outcome = stage(&store, &routes(), &list_spec(&["x-1", "x-2"]), None).unwrap();
    assert_eq!(wave_strs(&outcome), vec![vec!["x-1"], vec!["x-2"]]);
}

#[test]
fn nothing_to_schedule_is_an_input_error() {
    let store = MemoryStore::new();
    seed(&store, "n-1", BeadKind::Other);
    let err = stage(&store, &routes(), &list_spec(&["n-1"]), None).unwrap_err();
    assert!(matches!(err, StageError::Input(_)));
    assert!(store
        .list_by_kind(BeadKind::Convoy, None)
        .unwrap()
        .is_empty());
}

#[test]
fn missing_routing_refuses_staging() {
    let store = MemoryStore::new();
    seed(&store, "war-1", BeadKind::Task);
    let outcome = stage(&store, &routes(), &list_spec(&["war-1"]), None).unwrap();
    assert_eq!(outcome.status, StageStatus::Error);
    assert!(matches!(
        outcome.into_result().unwrap_err(),
        StageError::Routing { .. }
    ));
}

#[test]
fn failed_wave_one_dispatch_stays_per_bead() {
    struct FlakyDispatcher;
    impl Dispatcher for FlakyDispatcher {
        fn dispatch(&self, bead: &Bead, pool: &str) -> Result<(), DispatchError> {
            if bead.id.as_str() == "x-1" {
                Err(DispatchError::Unavailable {
                    pool: pool.to_string(),
                    reason: "worker slot stuck".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    let store = MemoryStore::new();
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    let outcome = stage(&store, &routes(), &list_spec(&["x-1", "x-2"]), None).unwrap();
    let convoy_id = outcome.convoy_id.unwrap();

    let launched = launch(&store, &routes(), &FlakyDispatcher, &convoy_id, false).unwrap();
    // the failure is recorded, the rest of the wave still went out
    assert_eq!(launched.failed.len(), 1);
    assert_eq!(launched.failed[0].0.as_str(), "x-1");
    assert_eq!(launched.dispatched.len(), 1);
    assert_eq!(launched.dispatched[0].0.as_str(), "x-2");

    // the convoy still opened; the feeder owns the retry
    assert_eq!(
        store.get(&convoy_id).unwrap().status,
        BeadStatus::from(ConvoyStatus::Open)
    );
    assert!(store.get(&"x-1".parse::<BeadId>().unwrap()).unwrap().assignee.is_none());
}

#[test]
fn capacity_outlook_does_not_demote_status() {
    let store = MemoryStore::new();
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    seed(&store, "x-3", BeadKind::Task);
    let table = StaticRoutes::new().with_route("x", "polecats").with_pool(
        "polecats",
        PoolConfig {
            capacity: Some(1),
            parked: false,
        },
    );

    let outcome = stage(&store, &table, &list_spec(&["x-1", "x-2", "x-3"]), None).unwrap();
    assert_eq!(outcome.status, StageStatus::StagedReady);
    assert!(outcome
        .report
        .warnings
        .iter()
        .any(|f| f.kind == FindingKind::CapacityOutlook));
}
