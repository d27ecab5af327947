//! Provider module over the persistent tile store.

use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{Lookup, ModuleKind, TileModule};
use crate::cache::{BoxFuture, TileStore};
use crate::coord::TileIndex;
use crate::error::TileError;

/// Serves tiles from a [`TileStore`].
///
/// Fresh entries are exact hits. Expired entries that have not been purged
/// yet are returned as approximations so something can be shown while a
/// fresh copy downloads.
///
/// This module owns closing the store on detach.
pub struct CacheModule {
    store: Arc<dyn TileStore>,
}

impl CacheModule {
    pub fn new(store: Arc<dyn TileStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TileStore> {
        &self.store
    }
}

impl TileModule for CacheModule {
    fn name(&self) -> &str {
        "cache"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Cache
    }

    fn load<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<Lookup, TileError>> {
        Box::pin(async move {
            match self.store.get(index).await? {
                Some(entry) if entry.is_expired() => {
                    debug!(tile = %index, expired_at = %entry.expires_at(), "Serving stale cache entry");
                    Ok(Lookup::Approximate(entry.into_data()))
                }
                Some(entry) => Ok(Lookup::Exact(entry.into_data())),
                None => Ok(Lookup::Miss),
            }
        })
    }

    fn detach(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.store.close().await {
                warn!(error = %e, "Failed to close tile store");
            }
        })
    }
}
