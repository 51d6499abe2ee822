#![deny(rustdoc::broken_intra_doc_links)]

//! The feeder: a long-running reconciler that releases dependents into
//! execution as their blockers close.
//!
//! One feeder runs per process. It drives a single select loop over two
//! inputs, the store's activity feed and a periodic sweep ticker, plus a
//! shutdown channel. All state of record lives in the store; the feeder
//! only keeps per-bead retry backoff and an in-flight ledger for capacity
//! accounting.

#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, tick, Receiver, Sender};
use crossbeam::select;
use gastown_core::bead::{Bead, BeadKind, BeadPatch, BeadStatus};
use gastown_core::convoy::ConvoyStatus;
use gastown_core::dispatch::Dispatcher;
use gastown_core::edge::{EdgeClass, EdgeDirection, BLOCKING_CLASSES};
use gastown_core::identifier::BeadId;
use gastown_core::routing::RoutingTable;
use gastown_core::store::{ActivityEvent, ActivityKind, BeadStore, StoreError};

/// How the feeder paces itself.
#[derive(Debug, Clone)]
pub struct FeederConfig {
    /// Sweep interval; also the cap on per-bead retry backoff
    pub tick: Duration,
    /// First retry delay after a dispatch failure, doubled per attempt
    pub backoff_base: Duration,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Command line args for running a feeder.
#[derive(Debug, Clone, clap::Args)]
pub struct FeedArgs {
    /// Sweep interval in seconds
    #[clap(long, default_value_t = 5)]
    pub tick: u64,
}

impl From<&FeedArgs> for FeederConfig {
    fn from(args: &FeedArgs) -> Self {
        Self {
            tick: Duration::from_secs(args.tick.max(1)),
            ..Self::default()
        }
    }
}

struct Backoff {
    attempts: u32,
    not_before: Instant,
}

/// The feeder loop.
///
/// [`Feeder::run`] blocks until shut down. The per-iteration primitives
/// ([`Feeder::handle_event`], [`Feeder::sweep`]) are public so embedders
/// and tests can drive the loop deterministically.
pub struct Feeder {
    store: Arc<dyn BeadStore>,
    routes: Arc<dyn RoutingTable>,
    dispatcher: Arc<dyn Dispatcher>,
    config: FeederConfig,
    backoff: HashMap<BeadId, Backoff>,
    /// Beads this feeder dispatched that it has not yet seen close,
    /// keyed to their pool. Counts against declared pool capacity.
    in_flight: HashMap<BeadId, String>,
}

impl Feeder {
    pub fn new(
        store: Arc<dyn BeadStore>,
        routes: Arc<dyn RoutingTable>,
        dispatcher: Arc<dyn Dispatcher>,
        config: FeederConfig,
    ) -> Self {
        Self {
            store,
            routes,
            dispatcher,
            config,
            backoff: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Create the channel whose sender stops a running feeder. Dropping
    /// the sender stops it too.
    pub fn shutdown_channel() -> (Sender<()>, Receiver<()>) {
        bounded(1)
    }

    /// Run until the shutdown channel fires or the store's activity feed
    /// ends. The in-flight iteration always completes; dispatches already
    /// issued belong to their workers.
    pub fn run(mut self, shutdown: Receiver<()>) {
        let events = self.store.subscribe();
        let ticker = tick(self.config.tick);
        info!("feeder started, sweeping every {:?}", self.config.tick);

        loop {
            select! {
                recv(shutdown) -> _ => {
                    info!("feeder shutting down");
                    break;
                }
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(&event),
                    Err(_) => {
                        info!("activity feed ended, feeder exiting");
                        break;
                    }
                },
                recv(ticker) -> _ => self.sweep(),
            }
        }
    }

    /// React to one activity event. Only closures matter: the closed
    /// bead's tracking convoys get fed.
    pub fn handle_event(&mut self, event: &ActivityEvent) {
        let closed = matches!(
            event.kind,
            ActivityKind::Closed | ActivityKind::StatusChanged(BeadStatus::Closed)
        );
        if !closed {
            return;
        }
        self.in_flight.remove(&event.bead);
        self.backoff.remove(&event.bead);

        let tracked_by = match self.store.list_edges(
            &event.bead,
            EdgeDirection::Incoming,
            &[EdgeClass::Tracks],
        ) {
            Ok(edges) => edges,
            Err(e) => {
                // the sweep is the safety net for missed events
                warn!("could not resolve convoys tracking {}: {}", event.bead, e);
                return;
            }
        };
        for edge in tracked_by {
            self.feed_convoy(&edge.from);
        }
    }

    /// The periodic sweep: feed every open convoy. Catches events the
    /// reactive path missed.
    pub fn sweep(&mut self) {
        let convoys = match self
            .store
            .list_by_kind(BeadKind::Convoy, Some(BeadStatus::Open))
        {
            Ok(convoys) => convoys,
            Err(e) => {
                warn!("sweep could not list open convoys: {}", e);
                return;
            }
        };
        trace!("sweeping {} open convoy(s)", convoys.len());
        for convoy in convoys {
            self.feed_convoy(&convoy.id);
        }
    }

    /// Feed one convoy: dispatch every tracked bead whose blockers are all
    /// closed, deferring on parked pools, capacity, and backoff. Closes
    /// the convoy once every tracked bead is closed.
    ///
    /// Both the event path and the sweep land here, and both rely on the
    /// status check below: a staged or closed convoy is inert.
    fn feed_convoy(&mut self, convoy_id: &BeadId) {
        let convoy = match self.store.get(convoy_id) {
            Ok(convoy) => convoy,
            Err(e) => {
                warn!("could not load convoy {}: {}", convoy_id, e);
                return;
            }
        };
        if convoy.kind != BeadKind::Convoy {
            return;
        }
        match ConvoyStatus::try_from(convoy.status) {
            Ok(status) if status.is_feedable() => {}
            _ => {
                trace!("convoy {} is {}, not feeding", convoy_id, convoy.status);
                return;
            }
        }

        let mut tracked = match self.tracked_beads(convoy_id) {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!("could not materialize convoy {}: {}", convoy_id, e);
                return;
            }
        };
        tracked.sort_by(|a, b| a.id.cmp(&b.id));

        if !tracked.is_empty() && tracked.iter().all(|bead| bead.status.is_closed()) {
            info!("all beads of convoy {} are closed", convoy_id);
            if let Err(e) = self.store.close(convoy_id, "all tracked beads closed") {
                warn!("could not close convoy {}: {}", convoy_id, e);
            }
            return;
        }

        // dispatches issued during this pass, per pool
        let mut issued: HashMap<String, usize> = HashMap::new();

        for bead in &tracked {
            if bead.status.is_closed() {
                self.in_flight.remove(&bead.id);
                continue;
            }
            if bead.assignee.is_some() {
                continue;
            }
            match self.is_blocked(&bead.id) {
                Ok(false) => {}
                Ok(true) => continue,
                Err(e) => {
                    // fail closed: skipping a dispatch is recoverable,
                    // double-dispatching is not
                    debug!("blocker view of {} unavailable ({}), deferring", bead.id, e);
                    continue;
                }
            }

            let Some(pool) = self.routes.resolve_pool(bead.id.prefix()) else {
                warn!("{} resolves to no pool, deferring", bead.id);
                continue;
            };
            if self.routes.pool_is_parked(&pool) {
                trace!("pool {} is parked, deferring {}", pool, bead.id);
                continue;
            }
            if !self.pool_has_room(&pool, &issued) {
                trace!("pool {} is at capacity, deferring {}", pool, bead.id);
                continue;
            }
            if let Some(backoff) = self.backoff.get(&bead.id) {
                if Instant::now() < backoff.not_before {
                    continue;
                }
            }

            match self.dispatcher.dispatch(bead, &pool) {
                Ok(()) => {
                    debug!("fed {} to pool {}", bead.id, pool);
                    if let Err(e) = self.store.update(&bead.id, BeadPatch::assign(pool.clone())) {
                        warn!("dispatched {} but could not record assignment: {}", bead.id, e);
                    }
                    *issued.entry(pool.clone()).or_default() += 1;
                    self.in_flight.insert(bead.id.clone(), pool);
                    self.backoff.remove(&bead.id);
                }
                Err(e) => {
                    warn!("dispatch of {} failed, will retry: {}", bead.id, e);
                    self.note_failure(&bead.id);
                }
            }
        }
    }

    /// Load the convoy's tracked beads from the store.
    fn tracked_beads(&self, convoy_id: &BeadId) -> Result<Vec<Bead>, StoreError> {
        let edges =
            self.store
                .list_edges(convoy_id, EdgeDirection::Outgoing, &[EdgeClass::Tracks])?;
        let mut beads = Vec::with_capacity(edges.len());
        for edge in edges {
            match self.store.get(&edge.to) {
                Ok(bead) => beads.push(bead),
                Err(StoreError::NotFound(id)) => {
                    warn!("convoy {} tracks missing bead {}", convoy_id, id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(beads)
    }

    /// Whether any blocking-class predecessor of the bead is still open,
    /// per the store's live view.
    fn is_blocked(&self, id: &BeadId) -> Result<bool, StoreError> {
        let blockers = self
            .store
            .list_edges(id, EdgeDirection::Incoming, &BLOCKING_CLASSES)?;
        for edge in blockers {
            match self.store.get(&edge.from) {
                Ok(blocker) if !blocker.status.is_closed() => return Ok(true),
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    // a deleted blocker can never close; treat as satisfied
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Declared capacity check: registry load, this feeder's in-flight
    /// ledger, and dispatches issued earlier in the same pass all count.
    fn pool_has_room(&self, pool: &str, issued: &HashMap<String, usize>) -> bool {
        let Some((current, max)) = self.routes.pool_capacity(pool) else {
            return true;
        };
        let ledger = self
            .in_flight
            .values()
            .filter(|assigned| assigned.as_str() == pool)
            .count();
        let used = current.max(ledger) + issued.get(pool).copied().unwrap_or(0);
        used < max
    }

    /// Exponential backoff, doubled per failed attempt and capped at the
    /// sweep interval.
    fn note_failure(&mut self, id: &BeadId) {
        let attempts = self.backoff.get(id).map(|b| b.attempts).unwrap_or(0) + 1;
        let delay = self
            .config
            .backoff_base
            .saturating_mul(1u32 << (attempts - 1).min(16))
            .min(self.config.tick);
        self.backoff.insert(
            id.clone(),
            Backoff {
                attempts,
                not_before: Instant::now() + delay,
            },
        );
    }
}
