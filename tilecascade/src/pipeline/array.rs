//! The provider array: request deduplication and chain orchestration.
//!
//! # Architecture
//!
//! ```text
//! request_tile(A) ─┐
//!                  │    in-flight table      one worker per tile
//! request_tile(A) ─┼──► DashMap<TileIndex, ──► assets → cache → archive
//!                  │     InFlightRequest>       → approximation → network
//! request_tile(B) ─┘                                   │
//!                                                      ▼
//!                                   callbacks (approximate?, then final)
//! ```
//!
//! `request_tile` never blocks: it registers the subscriber with an atomic
//! check-and-insert on the table and, for a new tile, spawns the worker.
//! Only the worker delivers, with no lock held, so each subscriber sees
//! at most an approximation followed by one final result.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::request::{
    InFlightRequest, RequestHandle, RequestState, Subscriber, TileCallback, TileDelivery,
    TileResult,
};
use crate::coord::TileIndex;
use crate::error::TileError;
use crate::network::NetworkAvailability;
use crate::provider::{Lookup, ModuleKind, TileModule};

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Calls to `request_tile` that were accepted
    pub requests: u64,
    /// Requests that joined a tile already in flight
    pub coalesced: u64,
    /// Network module invocations
    pub network_fetches: u64,
    pub exact_deliveries: u64,
    pub approximate_deliveries: u64,
    pub misses: u64,
    pub cancelled: u64,
    /// Tiles currently being resolved
    pub in_flight: u64,
}

impl PipelineStats {
    /// Share of requests served by an existing in-flight request.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.requests as f64
        }
    }
}

#[derive(Default)]
struct StatCounters {
    requests: AtomicU64,
    coalesced: AtomicU64,
    network_fetches: AtomicU64,
    exact_deliveries: AtomicU64,
    approximate_deliveries: AtomicU64,
    misses: AtomicU64,
    cancelled: AtomicU64,
}

/// How a worker's walk ended.
enum Outcome {
    Exact(Bytes),
    Exhausted,
    /// The pipeline shut down before the walk could finish.
    Abandoned,
}

struct ArrayInner {
    chain: Vec<Arc<dyn TileModule>>,
    network: Arc<dyn NetworkAvailability>,
    use_data_connection: AtomicBool,
    in_flight: DashMap<TileIndex, Arc<InFlightRequest>>,
    next_subscriber: AtomicU64,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    detached: AtomicBool,
    stats: StatCounters,
}

/// Orchestrates the provider chain for concurrent tile requests.
///
/// Guarantees at most one chain walk, and so at most one network fetch,
/// per tile at a time.
pub struct ProviderArray {
    inner: Arc<ArrayInner>,
    runtime: Handle,
}

impl ProviderArray {
    /// Creates an array over `chain`, walked in order.
    ///
    /// Workers are spawned on `runtime`, so requests may be issued from
    /// threads outside the runtime.
    pub fn new(
        chain: Vec<Arc<dyn TileModule>>,
        network: Arc<dyn NetworkAvailability>,
        use_data_connection: bool,
        runtime: Handle,
    ) -> Self {
        let inner = Arc::new(ArrayInner {
            chain,
            network,
            use_data_connection: AtomicBool::new(use_data_connection),
            in_flight: DashMap::new(),
            next_subscriber: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            detached: AtomicBool::new(false),
            stats: StatCounters::default(),
        });

        if let Some(mut changes) = inner.network.subscribe() {
            let watcher = Arc::clone(&inner);
            inner.tasks.spawn_on(
                async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = watcher.shutdown.cancelled() => break,
                            changed = changes.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                let available = *changes.borrow_and_update();
                                info!(
                                    available,
                                    degraded = watcher.is_degraded(),
                                    "Tile pipeline connectivity changed"
                                );
                            }
                        }
                    }
                },
                &runtime,
            );
        }

        info!(
            modules = ?inner.chain.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "Tile pipeline started"
        );

        Self { inner, runtime }
    }

    /// Requests a tile.
    ///
    /// Returns immediately. The callback later receives an optional
    /// approximation followed by one final result, unless the request is
    /// cancelled or the pipeline is detached first.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Detached`] after [`ProviderArray::detach`].
    pub fn request_tile(
        &self,
        index: TileIndex,
        callback: Arc<dyn TileCallback>,
    ) -> Result<RequestHandle, TileError> {
        let inner = &self.inner;
        if inner.detached.load(Ordering::Acquire) {
            return Err(TileError::Detached);
        }

        let id = inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (subscriber, handle) = Subscriber::new(&index, id, callback);
        inner.stats.requests.fetch_add(1, Ordering::Relaxed);

        match inner.in_flight.entry(index.clone()) {
            Entry::Occupied(entry) => {
                entry.get().add_subscriber(subscriber);
                inner.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                trace!(tile = %index, "Joined in-flight request");
            }
            Entry::Vacant(entry) => {
                let request = Arc::new(InFlightRequest::new(index.clone(), subscriber));
                entry.insert(Arc::clone(&request));

                let worker = Arc::clone(inner);
                inner
                    .tasks
                    .spawn_on(async move { worker.run(request).await }, &self.runtime);
                trace!(tile = %index, "New tile request");
            }
        }

        Ok(handle)
    }

    /// Cancels a subscription.
    ///
    /// The subscriber receives nothing further. The tile's resolution
    /// carries on for other subscribers and still populates the cache.
    /// Returns `false` if the handle was already cancelled.
    pub fn cancel(&self, handle: &RequestHandle) -> bool {
        if !handle.mark_cancelled() {
            return false;
        }
        if let Some(request) = self.inner.in_flight.get(handle.index()) {
            request.remove_subscriber(handle.id());
        }
        self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        debug!(tile = %handle.index(), id = handle.id(), "Tile request cancelled");
        true
    }

    /// Tears the pipeline down.
    ///
    /// Workers stop before their next module and pending subscribers are
    /// dropped without notification. Network modules are detached first,
    /// so queued downloads give up while started ones finish and write
    /// through to the store. The remaining modules, the tile store among
    /// them, are detached once every worker has exited. Runs once; later
    /// calls return immediately.
    pub async fn detach(&self) {
        let inner = &self.inner;
        if inner.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(in_flight = inner.in_flight.len(), "Detaching tile pipeline");

        inner.shutdown.cancel();
        inner.tasks.close();

        let (network, local): (Vec<_>, Vec<_>) = inner
            .chain
            .iter()
            .partition(|module| module.kind() == ModuleKind::Network);
        join_all(network.iter().map(|module| module.detach())).await;

        inner.tasks.wait().await;
        inner.in_flight.clear();

        join_all(local.iter().map(|module| module.detach())).await;

        inner.log_stats();
        info!("Tile pipeline detached");
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    /// True while the network module is skipped: offline, or the data
    /// connection is disabled.
    pub fn is_degraded(&self) -> bool {
        self.inner.is_degraded()
    }

    /// Enables or disables downloads regardless of connectivity.
    pub fn set_use_data_connection(&self, enabled: bool) {
        let previous = self.inner.use_data_connection.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(enabled, "Data connection setting changed");
        }
    }

    pub fn uses_data_connection(&self) -> bool {
        self.inner.use_data_connection.load(Ordering::Acquire)
    }

    /// State of the request for `index`; `Idle` when none is in flight.
    pub fn state(&self, index: &TileIndex) -> RequestState {
        self.inner
            .in_flight
            .get(index)
            .map(|request| request.state())
            .unwrap_or(RequestState::Idle)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Names of the chain's modules, in order.
    pub fn module_names(&self) -> Vec<String> {
        self.inner.chain.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn stats(&self) -> PipelineStats {
        self.inner.stats()
    }

    /// Logs current statistics at info level.
    pub fn log_stats(&self) {
        self.inner.log_stats();
    }
}

impl ArrayInner {
    fn is_degraded(&self) -> bool {
        !self.network.is_available() || !self.use_data_connection.load(Ordering::Acquire)
    }

    /// Worker entry point.
    ///
    /// Shutdown is checked between modules, so a module load that has
    /// started, such as a download and its write to the store, runs to
    /// completion.
    async fn run(self: Arc<Self>, request: Arc<InFlightRequest>) {
        let index = request.index();
        let outcome = if index.is_valid() {
            self.walk_chain(&request).await
        } else {
            debug!(tile = %index, "Tile index outside the grid");
            Outcome::Exhausted
        };
        self.finish(&request, outcome);
    }

    async fn walk_chain(&self, request: &Arc<InFlightRequest>) -> Outcome {
        let index = request.index();
        let mut has_interim = false;

        for module in &self.chain {
            if self.shutdown.is_cancelled() {
                return Outcome::Abandoned;
            }
            if module.requires_network() && self.is_degraded() {
                debug!(tile = %index, module = module.name(), "Degraded mode, skipping module");
                continue;
            }
            if module.kind() == ModuleKind::Approximation && has_interim {
                continue;
            }
            if module.kind() == ModuleKind::Network {
                self.stats.network_fetches.fetch_add(1, Ordering::Relaxed);
            }

            match module.load(index).await {
                Ok(Lookup::Exact(data)) => {
                    debug!(tile = %index, module = module.name(), "Tile resolved");
                    return Outcome::Exact(data);
                }
                Ok(Lookup::Approximate(data)) => {
                    if !has_interim {
                        has_interim = true;
                        debug!(tile = %index, module = module.name(), "Interim approximation");
                        self.deliver_approximation(request, data);
                    }
                }
                Ok(Lookup::Miss) => {
                    trace!(tile = %index, module = module.name(), "Module miss");
                }
                Err(TileError::TransientFetchFailure { reason, .. }) => {
                    warn!(tile = %index, module = module.name(), reason = %reason, "Tile fetch failed");
                }
                Err(e) => {
                    debug!(tile = %index, module = module.name(), error = %e, "Module lookup failed");
                }
            }
        }
        Outcome::Exhausted
    }

    fn deliver_approximation(&self, request: &InFlightRequest, data: Bytes) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let subscribers = request.record_approximation(data.clone());
        for subscriber in subscribers {
            let delivery = TileDelivery {
                index: request.index().clone(),
                result: TileResult::Approximate(data.clone()),
            };
            if subscriber.deliver(delivery) {
                self.stats.approximate_deliveries.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Leaves the table, then hands out the final result.
    fn finish(&self, request: &Arc<InFlightRequest>, outcome: Outcome) {
        self.in_flight
            .remove_if(request.index(), |_, current| Arc::ptr_eq(current, request));

        if matches!(outcome, Outcome::Abandoned) || self.shutdown.is_cancelled() {
            // Subscribers are dropped without a delivery
            request.complete(RequestState::Failed);
            debug!(tile = %request.index(), "Tile request abandoned on detach");
            return;
        }

        let (result, subscribers) = match outcome {
            Outcome::Exact(data) => (
                TileResult::Exact(data),
                request.complete(RequestState::Resolved),
            ),
            Outcome::Exhausted => match request.complete_with_approximation() {
                Some((data, pending)) => {
                    debug!(tile = %request.index(), "Approximation stands as final result");
                    (TileResult::Approximate(data), pending)
                }
                None => (TileResult::Miss, request.complete(RequestState::Failed)),
            },
            Outcome::Abandoned => return,
        };

        let counter = match &result {
            TileResult::Exact(_) => &self.stats.exact_deliveries,
            TileResult::Approximate(_) => &self.stats.approximate_deliveries,
            TileResult::Miss => &self.stats.misses,
        };
        for subscriber in subscribers {
            let delivery = TileDelivery {
                index: request.index().clone(),
                result: result.clone(),
            };
            if subscriber.deliver(delivery) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn stats(&self) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            requests: load(&self.stats.requests),
            coalesced: load(&self.stats.coalesced),
            network_fetches: load(&self.stats.network_fetches),
            exact_deliveries: load(&self.stats.exact_deliveries),
            approximate_deliveries: load(&self.stats.approximate_deliveries),
            misses: load(&self.stats.misses),
            cancelled: load(&self.stats.cancelled),
            in_flight: self.in_flight.len() as u64,
        }
    }

    fn log_stats(&self) {
        let stats = self.stats();
        info!(
            requests = stats.requests,
            coalesced = stats.coalesced,
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            network_fetches = stats.network_fetches,
            exact = stats.exact_deliveries,
            approximate = stats.approximate_deliveries,
            misses = stats.misses,
            cancelled = stats.cancelled,
            "Tile pipeline statistics"
        );
    }
}

impl Drop for ProviderArray {
    fn drop(&mut self) {
        // Workers hold their own reference to the shared state
        self.inner.shutdown.cancel();
    }
}
