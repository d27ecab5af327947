//! Per-tile request bookkeeping.
//!
//! One [`InFlightRequest`] exists per tile being resolved. It holds the
//! subscribers waiting for the tile and tracks the request through its
//! states:
//!
//! ```text
//! Idle ──► Requested ──┬──────────────────────────┬──► Resolved
//!                      │                          │
//!                      └──► ApproximateDelivered ─┴──► Failed
//! ```
//!
//! The state lives behind a short `parking_lot` lock that is never held
//! across an await or a callback.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use crate::coord::TileIndex;

/// Lifecycle state of a tile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No request in flight.
    Idle,
    /// The chain is being walked.
    Requested,
    /// An interim approximation went out; the walk continues.
    ApproximateDelivered,
    /// An exact tile was delivered.
    Resolved,
    /// The chain was exhausted without an exact tile.
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Idle => "idle",
            RequestState::Requested => "requested",
            RequestState::ApproximateDelivered => "approximate-delivered",
            RequestState::Resolved => "resolved",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileResult {
    Exact(Bytes),
    Approximate(Bytes),
    /// Nothing could be found for the tile.
    Miss,
}

impl TileResult {
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            TileResult::Exact(data) | TileResult::Approximate(data) => Some(data),
            TileResult::Miss => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TileResult::Exact(_))
    }
}

/// A "tile ready" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDelivery {
    pub index: TileIndex,
    pub result: TileResult,
}

/// Receiver of tile notifications.
///
/// Called on a runtime worker thread, never on the thread that issued the
/// request. Implementations must not block; hand the delivery off to the
/// UI thread instead.
pub trait TileCallback: Send + Sync {
    fn deliver(&self, delivery: TileDelivery);
}

impl<F> TileCallback for F
where
    F: Fn(TileDelivery) + Send + Sync,
{
    fn deliver(&self, delivery: TileDelivery) {
        self(delivery)
    }
}

/// Identifies one subscription, for cancellation.
#[derive(Clone)]
pub struct RequestHandle {
    index: TileIndex,
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl RequestHandle {
    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A callback registered on a request.
#[derive(Clone)]
pub(crate) struct Subscriber {
    id: u64,
    callback: Arc<dyn TileCallback>,
    cancelled: Arc<AtomicBool>,
    received_approximate: bool,
}

impl Subscriber {
    /// Creates a subscriber and the handle that cancels it.
    pub(crate) fn new(
        index: &TileIndex,
        id: u64,
        callback: Arc<dyn TileCallback>,
    ) -> (Self, RequestHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = RequestHandle {
            index: index.clone(),
            id,
            cancelled: Arc::clone(&cancelled),
        };
        let subscriber = Self {
            id,
            callback,
            cancelled,
            received_approximate: false,
        };
        (subscriber, handle)
    }

    /// Delivers unless cancelled. Returns whether the callback ran to
    /// completion.
    ///
    /// A panicking callback is contained so the worker can still finish
    /// the request for everyone else.
    pub(crate) fn deliver(&self, delivery: TileDelivery) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        let tile = delivery.index.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| self.callback.deliver(delivery))) {
            Ok(()) => true,
            Err(_) => {
                warn!(tile = %tile, id = self.id, "Tile callback panicked");
                false
            }
        }
    }
}

struct RequestInner {
    state: RequestState,
    subscribers: Vec<Subscriber>,
    approximation: Option<Bytes>,
}

/// A tile being resolved, shared by every subscriber that asked for it.
pub(crate) struct InFlightRequest {
    index: TileIndex,
    inner: Mutex<RequestInner>,
}

impl InFlightRequest {
    pub(crate) fn new(index: TileIndex, first: Subscriber) -> Self {
        Self {
            index,
            inner: Mutex::new(RequestInner {
                state: RequestState::Requested,
                subscribers: vec![first],
                approximation: None,
            }),
        }
    }

    pub(crate) fn index(&self) -> &TileIndex {
        &self.index
    }

    pub(crate) fn state(&self) -> RequestState {
        self.inner.lock().state
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub(crate) fn add_subscriber(&self, subscriber: Subscriber) {
        self.inner.lock().subscribers.push(subscriber);
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub(crate) fn remove_subscriber(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        inner.subscribers.len() != before
    }

    /// Records an interim approximation and returns the subscribers to
    /// notify. Returns nothing if an approximation was already recorded.
    pub(crate) fn record_approximation(&self, data: Bytes) -> Vec<Subscriber> {
        let mut inner = self.inner.lock();
        if inner.approximation.is_some() {
            return Vec::new();
        }
        inner.state = RequestState::ApproximateDelivered;
        inner.approximation = Some(data);
        inner
            .subscribers
            .iter_mut()
            .map(|s| {
                s.received_approximate = true;
                s.clone()
            })
            .collect()
    }

    /// Moves to a terminal state and takes every subscriber.
    ///
    /// Must only be called after the request has left the in-flight
    /// table, so no subscriber can join afterwards.
    pub(crate) fn complete(&self, state: RequestState) -> Vec<Subscriber> {
        let mut inner = self.inner.lock();
        inner.state = state;
        std::mem::take(&mut inner.subscribers)
    }

    /// Terminal step when the approximation stands as the final result.
    ///
    /// Returns the approximation and the subscribers that have not seen it.
    pub(crate) fn complete_with_approximation(&self) -> Option<(Bytes, Vec<Subscriber>)> {
        let mut inner = self.inner.lock();
        let data = inner.approximation.clone()?;
        inner.state = RequestState::Failed;
        let pending = std::mem::take(&mut inner.subscribers)
            .into_iter()
            .filter(|s| !s.received_approximate)
            .collect();
        Some((data, pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_subscriber(
        index: &TileIndex,
        id: u64,
        counter: Arc<AtomicUsize>,
    ) -> (Subscriber, RequestHandle) {
        Subscriber::new(
            index,
            id,
            Arc::new(move |_d: TileDelivery| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_new_request_is_requested() {
        let index = TileIndex::new("Mapnik", 1, 0, 0);
        let (sub, _handle) = counting_subscriber(&index, 1, Arc::default());
        let request = InFlightRequest::new(index, sub);

        assert_eq!(request.state(), RequestState::Requested);
        assert_eq!(request.subscriber_count(), 1);
    }

    #[test]
    fn test_approximation_recorded_once() {
        let index = TileIndex::new("Mapnik", 1, 0, 0);
        let (sub, _handle) = counting_subscriber(&index, 1, Arc::default());
        let request = InFlightRequest::new(index, sub);

        assert_eq!(request.record_approximation(Bytes::from_static(b"a")).len(), 1);
        assert!(request.record_approximation(Bytes::from_static(b"b")).is_empty());
        assert_eq!(request.state(), RequestState::ApproximateDelivered);
    }

    #[test]
    fn test_late_joiner_gets_standing_approximation() {
        let index = TileIndex::new("Mapnik", 1, 0, 0);
        let (early, _h1) = counting_subscriber(&index, 1, Arc::default());
        let (late, _h2) = counting_subscriber(&index, 2, Arc::default());
        let request = InFlightRequest::new(index, early);

        request.record_approximation(Bytes::from_static(b"approx"));
        request.add_subscriber(late);

        let (data, pending) = request.complete_with_approximation().unwrap();
        assert_eq!(data.as_ref(), b"approx");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, 2);
        assert_eq!(request.state(), RequestState::Failed);
    }

    #[test]
    fn test_complete_without_approximation() {
        let index = TileIndex::new("Mapnik", 1, 0, 0);
        let (sub, _handle) = counting_subscriber(&index, 1, Arc::default());
        let request = InFlightRequest::new(index, sub);

        assert!(request.complete_with_approximation().is_none());
        assert_eq!(request.complete(RequestState::Resolved).len(), 1);
        assert_eq!(request.state(), RequestState::Resolved);
    }

    #[test]
    fn test_cancelled_subscriber_not_invoked() {
        let index = TileIndex::new("Mapnik", 1, 0, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        let (sub, handle) = counting_subscriber(&index, 1, Arc::clone(&counter));

        assert!(handle.mark_cancelled());
        assert!(!handle.mark_cancelled());
        let delivered = sub.deliver(TileDelivery {
            index,
            result: TileResult::Miss,
        });

        assert!(!delivered);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_subscriber() {
        let index = TileIndex::new("Mapnik", 1, 0, 0);
        let (sub, _handle) = counting_subscriber(&index, 7, Arc::default());
        let request = InFlightRequest::new(index, sub);

        assert!(request.remove_subscriber(7));
        assert!(!request.remove_subscriber(7));
        assert_eq!(request.subscriber_count(), 0);
    }

    #[test]
    fn test_tile_result_bytes() {
        assert!(TileResult::Miss.bytes().is_none());
        assert!(TileResult::Exact(Bytes::from_static(b"x")).is_exact());
        assert!(!TileResult::Approximate(Bytes::from_static(b"x")).is_exact());
    }
}
