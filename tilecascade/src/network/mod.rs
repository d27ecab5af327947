//! Network availability signal.
//!
//! The platform (or whatever embeds the pipeline) pushes connectivity
//! changes into a [`NetworkMonitor`]; the pipeline only ever reads it.
//! Readings are advisory: "available" does not promise that the next
//! fetch succeeds, it only means a fetch is worth trying.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

/// Read side of a connectivity signal.
///
/// Must be cheap and non-blocking from any thread.
pub trait NetworkAvailability: Send + Sync {
    /// Current best-effort connectivity.
    fn is_available(&self) -> bool;

    /// Subscribes to connectivity changes, if this source can report them.
    fn subscribe(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}

/// Connectivity signal updated by an external collaborator.
///
/// Reads hit an atomic; changes are also broadcast on a watch channel so
/// interested parties can react without polling.
pub struct NetworkMonitor {
    available: AtomicBool,
    sender: watch::Sender<bool>,
}

impl NetworkMonitor {
    /// Creates a monitor with an initial reading.
    pub fn new(initially_available: bool) -> Self {
        let (sender, _rx) = watch::channel(initially_available);
        Self {
            available: AtomicBool::new(initially_available),
            sender,
        }
    }

    /// Records a connectivity change.
    ///
    /// Repeated identical readings are ignored.
    pub fn set_available(&self, available: bool) {
        let previous = self.available.swap(available, Ordering::AcqRel);
        if previous != available {
            info!(available, "Network availability changed");
            self.sender.send_replace(available);
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkAvailability for NetworkMonitor {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn subscribe(&self) -> Option<watch::Receiver<bool>> {
        Some(self.sender.subscribe())
    }
}

/// Fixed connectivity reading.
#[derive(Debug, Clone, Copy)]
pub struct StaticAvailability(pub bool);

impl NetworkAvailability for StaticAvailability {
    fn is_available(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_initial_state() {
        assert!(NetworkMonitor::new(true).is_available());
        assert!(!NetworkMonitor::new(false).is_available());
        assert!(NetworkMonitor::default().is_available());
    }

    #[test]
    fn test_static_availability() {
        assert!(StaticAvailability(true).is_available());
        assert!(!StaticAvailability(false).is_available());
        assert!(StaticAvailability(true).subscribe().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let monitor = NetworkMonitor::new(true);
        let mut rx = monitor.subscribe().unwrap();

        monitor.set_available(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
        assert!(!monitor.is_available());

        monitor.set_available(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_identical_reading_not_broadcast() {
        let monitor = NetworkMonitor::new(true);
        let rx = monitor.subscribe().unwrap();

        monitor.set_available(true);
        assert!(!rx.has_changed().unwrap());
    }
}
