//! Feeder behavior against an in-memory store.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gastown_convoy::core::manager::{launch, stage};
use gastown_convoy::core::working_set::WorkingSetSpec;
use gastown_core::bead::{Bead, BeadKind, BeadStatus, NewBead};
use gastown_core::dispatch::{DispatchError, Dispatcher};
use gastown_core::edge::{Edge, EdgeClass};
use gastown_core::identifier::BeadId;
use gastown_core::routing::{PoolConfig, StaticRoutes};
use gastown_core::store::{ActivityEvent, ActivityKind, BeadStore, MemoryStore};
use gastown_feeder::{Feeder, FeederConfig};
use parking_lot::Mutex;
use time::OffsetDateTime;

#[derive(Default)]
struct RecordingDispatcher {
    calls: Mutex<Vec<(String, String)>>,
    fail: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    fn dispatched(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn fail_for(&self, id: &str) {
        self.fail.lock().push(id.to_string());
    }

    fn heal(&self) {
        self.fail.lock().clear();
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, bead: &Bead, pool: &str) -> Result<(), DispatchError> {
        if self.fail.lock().iter().any(|id| id == bead.id.as_str()) {
            return Err(DispatchError::Unavailable {
                pool: pool.to_string(),
                reason: "no free slot".to_string(),
            });
        }
        self.calls
            .lock()
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
    StaticRoutes::new().with_route("x", "polecats")
}

fn fast_config() -> FeederConfig {
    FeederConfig {
        tick: Duration::from_millis(10),
        backoff_base: Duration::from_millis(1),
    }
}

fn closed_event(id: &str) -> ActivityEvent {
    ActivityEvent {
        ts: OffsetDateTime::now_utc(),
        bead: id.parse().unwrap(),
        actor: "test".to_string(),
        kind: ActivityKind::Closed,
    }
}

/// Stage a list of beads and launch the convoy, returning its id.
fn stage_and_launch(
    store: &MemoryStore,
    table: &StaticRoutes,
    dispatcher: &dyn Dispatcher,
    ids: &[&str],
) -> BeadId {
    let spec = WorkingSetSpec::List(ids.iter().map(|id| id.parse().unwrap()).collect());
    let outcome = stage(store, table, &spec, None).unwrap();
    let convoy_id = outcome.convoy_id.unwrap();
    launch(store, table, dispatcher, &convoy_id, true).unwrap();
    convoy_id
}

fn make_feeder(
    store: &Arc<MemoryStore>,
    table: StaticRoutes,
    dispatcher: &Arc<RecordingDispatcher>,
) -> Feeder {
    Feeder::new(
        store.clone(),
        Arc::new(table),
        dispatcher.clone(),
        fast_config(),
    )
}

#[test]
fn closing_a_blocker_releases_its_dependent() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    link(&store, "x-1", "x-2", EdgeClass::Blocks);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    stage_and_launch(&store, &routes(), dispatcher.as_ref(), &["x-1", "x-2"]);
    assert_eq!(dispatcher.dispatched(), vec!["x-1"]);

    let mut feeder = make_feeder(&store, routes(), &dispatcher);

    // not released while the blocker is open
    feeder.sweep();
    assert_eq!(dispatcher.dispatched(), vec!["x-1"]);

    store.close(&"x-1".parse().unwrap(), "done").unwrap();
    feeder.handle_event(&closed_event("x-1"));

    assert_eq!(dispatcher.dispatched(), vec!["x-1", "x-2"]);
    let x2 = store.get(&"x-2".parse().unwrap()).unwrap();
    assert_eq!(x2.assignee.as_deref(), Some("polecats"));
}

#[test]
fn the_sweep_catches_missed_events() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    link(&store, "x-1", "x-2", EdgeClass::Blocks);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    stage_and_launch(&store, &routes(), dispatcher.as_ref(), &["x-1", "x-2"]);

    store.close(&"x-1".parse().unwrap(), "done").unwrap();

    // no event delivered; the periodic sweep alone must release x-2
    let mut feeder = make_feeder(&store, routes(), &dispatcher);
    feeder.sweep();
    assert_eq!(dispatcher.dispatched(), vec!["x-1", "x-2"]);
}

#[test]
fn staged_convoys_are_inert_on_both_paths() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    link(&store, "x-1", "x-2", EdgeClass::Blocks);

    // staged, never launched
    let spec = WorkingSetSpec::List(vec!["x-1".parse().unwrap(), "x-2".parse().unwrap()]);
    stage(store.as_ref(), &routes(), &spec, None).unwrap();

    store.close(&"x-1".parse().unwrap(), "done").unwrap();

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut feeder = make_feeder(&store, routes(), &dispatcher);
    feeder.sweep();
    feeder.handle_event(&closed_event("x-1"));

    assert!(
        dispatcher.dispatched().is_empty(),
        "staged convoys must never be fed"
    );
}

#[test]
fn parked_pools_defer_dispatch() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    // launch with a healthy table, then park the pool for the feeder
    let convoy_id = {
        let spec = WorkingSetSpec::List(vec!["x-1".parse().unwrap()]);
        let outcome = stage(store.as_ref(), &routes(), &spec, None).unwrap();
        outcome.convoy_id.unwrap()
    };
    store
        .update(
            &convoy_id,
            gastown_core::bead::BeadPatch::status(BeadStatus::Open),
        )
        .unwrap();

    let mut feeder = make_feeder(&store, routes().park("polecats"), &dispatcher);
    feeder.sweep();
    assert!(dispatcher.dispatched().is_empty());

    // unparked table on a fresh feeder picks it right up
    let mut feeder = feeder_unparked(&store, &dispatcher);
    feeder.sweep();
    assert_eq!(dispatcher.dispatched(), vec!["x-1"]);
}

fn feeder_unparked(store: &Arc<MemoryStore>, dispatcher: &Arc<RecordingDispatcher>) -> Feeder {
    Feeder::new(
        store.clone(),
        Arc::new(routes()),
        dispatcher.clone(),
        fast_config(),
    )
}

#[test]
fn declared_capacity_limits_each_pass() {
    let store = Arc::new(MemoryStore::new());
    for id in ["x-1", "x-2", "x-3"] {
        seed(&store, id, BeadKind::Task);
    }
    let table = StaticRoutes::new().with_route("x", "polecats").with_pool(
        "polecats",
        PoolConfig {
            capacity: Some(1),
            parked: false,
        },
    );

    // convoy assembled by hand so nothing is assigned yet
    let convoy = store
        .create(NewBead::new(BeadKind::Convoy, "capacity run").with_status(BeadStatus::Open))
        .unwrap();
    for id in ["x-1", "x-2", "x-3"] {
        link(&store, convoy.id.as_str(), id, EdgeClass::Tracks);
    }

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut feeder = Feeder::new(
        store.clone(),
        Arc::new(table),
        dispatcher.clone(),
        fast_config(),
    );

    feeder.sweep();
    assert_eq!(dispatcher.dispatched(), vec!["x-1"], "capacity 1 means one dispatch");

    // nothing frees up, nothing more goes out
    feeder.sweep();
    assert_eq!(dispatcher.dispatched(), vec!["x-1"]);

    // a closure frees the slot for the next bead
    store.close(&"x-1".parse().unwrap(), "done").unwrap();
    feeder.handle_event(&closed_event("x-1"));
    assert_eq!(dispatcher.dispatched(), vec!["x-1", "x-2"]);
}

#[test]
fn convoy_closes_when_every_bead_is_done() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let convoy_id = stage_and_launch(&store, &routes(), dispatcher.as_ref(), &["x-1"]);

    store.close(&"x-1".parse().unwrap(), "done").unwrap();

    let mut feeder = make_feeder(&store, routes(), &dispatcher);
    feeder.sweep();

    let convoy = store.get(&convoy_id).unwrap();
    assert!(convoy.status.is_closed());
    assert!(convoy.body.contains("all tracked beads closed"));

    // a closed convoy is inert from then on
    feeder.sweep();
    assert_eq!(dispatcher.dispatched().len(), 1);
}

#[test]
fn failed_dispatches_back_off_and_retry() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher.fail_for("x-1");

    let convoy = store
        .create(NewBead::new(BeadKind::Convoy, "retry run").with_status(BeadStatus::Open))
        .unwrap();
    link(&store, convoy.id.as_str(), "x-1", EdgeClass::Tracks);

    let mut feeder = make_feeder(&store, routes(), &dispatcher);
    feeder.sweep();
    assert!(dispatcher.dispatched().is_empty());
    assert!(store.get(&"x-1".parse().unwrap()).unwrap().assignee.is_none());

    // heal the pool and wait out the backoff
    dispatcher.heal();
    thread::sleep(Duration::from_millis(15));
    feeder.sweep();
    assert_eq!(dispatcher.dispatched(), vec!["x-1"]);
    assert_eq!(
        store
            .get(&"x-1".parse().unwrap())
            .unwrap()
            .assignee
            .as_deref(),
        Some("polecats")
    );
}

#[test]
fn already_assigned_beads_are_not_redispatched() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let _convoy_id = stage_and_launch(&store, &routes(), dispatcher.as_ref(), &["x-1"]);
    assert_eq!(dispatcher.dispatched(), vec!["x-1"]);

    let mut feeder = make_feeder(&store, routes(), &dispatcher);
    feeder.sweep();
    feeder.sweep();
    assert_eq!(
        dispatcher.dispatched(),
        vec!["x-1"],
        "an assigned bead must not dispatch twice"
    );
}

#[test]
fn run_loop_reacts_to_live_events_and_shuts_down() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "x-1", BeadKind::Task);
    seed(&store, "x-2", BeadKind::Task);
    link(&store, "x-1", "x-2", EdgeClass::Blocks);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    stage_and_launch(&store, &routes(), dispatcher.as_ref(), &["x-1", "x-2"]);

    let feeder = make_feeder(&store, routes(), &dispatcher);
    let (shutdown_tx, shutdown_rx) = Feeder::shutdown_channel();
    let handle = thread::spawn(move || feeder.run(shutdown_rx));

    // the store broadcasts the closure to the running feeder
    store.close(&"x-1".parse().unwrap(), "done").unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while dispatcher.dispatched().len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(dispatcher.dispatched(), vec!["x-1", "x-2"]);

    shutdown_tx.send(()).unwrap();
    handle.join().unwrap();
}
