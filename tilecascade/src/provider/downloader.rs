//! Network downloader.
//!
//! The last module in the chain. Fetches a tile over HTTP, validates it,
//! writes it through to the tile store and returns it. Failures are
//! reported once and never retried here; the next request for the tile
//! tries again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use super::http::AsyncHttpClient;
use super::types::{Lookup, ModuleKind, TileModule};
use crate::cache::{BoxFuture, CacheEntry, ExpirationPolicy, TileStore};
use crate::coord::TileIndex;
use crate::error::TileError;
use crate::source::TileSource;

/// Default cap on simultaneous downloads.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 8;

/// Default fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Artificial delay before each fetch, simulating a slow link.
    pub lag: Duration,
    /// Upper bound on one fetch, headers and body included.
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub expiration: ExpirationPolicy,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            lag: Duration::ZERO,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            expiration: ExpirationPolicy::default(),
        }
    }
}

/// Downloads tiles and writes them through to the store.
pub struct NetworkDownloader<C> {
    source: Arc<TileSource>,
    client: C,
    store: Option<Arc<dyn TileStore>>,
    config: DownloaderConfig,
    permits: Semaphore,
    fetches: AtomicU64,
}

impl<C: AsyncHttpClient> NetworkDownloader<C> {
    /// Creates a downloader. Without a store, tiles are not persisted.
    pub fn new(
        source: Arc<TileSource>,
        client: C,
        store: Option<Arc<dyn TileStore>>,
        config: DownloaderConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent.max(1));
        Self {
            source,
            client,
            store,
            config,
            permits,
            fetches: AtomicU64::new(0),
        }
    }

    /// Number of HTTP requests issued.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    async fn fetch(&self, index: &TileIndex) -> Result<Lookup, TileError> {
        if index.source() != self.source.name()
            || self.source.is_offline()
            || !self.source.supports_zoom(index.zoom())
        {
            return Ok(Lookup::Miss);
        }

        if !self.config.lag.is_zero() {
            trace!(tile = %index, lag_ms = self.config.lag.as_millis() as u64, "Applying link lag");
            tokio::time::sleep(self.config.lag).await;
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TileError::fetch_failed(index, "downloader detached"))?;

        let url = self.source.url_for(index);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(tile = %index, url = %url, "Downloading tile");

        let response = match tokio::time::timeout(self.config.timeout, self.client.get(&url)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(TileError::fetch_failed(index, e.to_string())),
            Err(_) => {
                return Err(TileError::fetch_failed(
                    index,
                    format!("timed out after {}ms", self.config.timeout.as_millis()),
                ))
            }
        };

        if response.body.is_empty() {
            return Err(TileError::fetch_failed(index, "empty response body"));
        }
        if image::guess_format(&response.body).is_err() {
            return Err(TileError::fetch_failed(index, "response is not an image"));
        }

        if let Some(store) = &self.store {
            let expires_at = self.config.expiration.expires_at(Utc::now(), &response.freshness);
            let entry = CacheEntry::new(index.clone(), response.body.clone(), expires_at)
                .with_validator(response.validator);
            if let Err(e) = store.put(entry).await {
                warn!(tile = %index, error = %e, "Failed to cache downloaded tile");
            }
        }

        Ok(Lookup::Exact(response.body))
    }
}

impl<C: AsyncHttpClient> TileModule for NetworkDownloader<C> {
    fn name(&self) -> &str {
        "network"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Network
    }

    fn requires_network(&self) -> bool {
        true
    }

    fn load<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<Lookup, TileError>> {
        Box::pin(self.fetch(index))
    }

    fn detach(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.permits.close();
        })
    }
}
