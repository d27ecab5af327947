//! Open/closed gate shared by store implementations.
//!
//! Every store operation holds a read guard for its whole duration;
//! closing takes the write guard, so it waits for in-progress writes to
//! land before flipping the store to closed.

use tokio::sync::{RwLock, RwLockReadGuard};

use super::traits::StoreError;

pub(crate) struct StoreGate {
    open: RwLock<bool>,
}

impl StoreGate {
    pub(crate) fn new() -> Self {
        Self {
            open: RwLock::new(true),
        }
    }

    /// Enters the gate, failing if the store is closed.
    pub(crate) async fn enter(&self) -> Result<RwLockReadGuard<'_, bool>, StoreError> {
        let guard = self.open.read().await;
        if *guard {
            Ok(guard)
        } else {
            Err(StoreError::Closed)
        }
    }

    /// Closes the gate once all holders have left.
    ///
    /// Returns `false` if the gate was already closed.
    pub(crate) async fn close(&self) -> bool {
        let mut guard = self.open.write().await;
        std::mem::replace(&mut *guard, false)
    }
}
