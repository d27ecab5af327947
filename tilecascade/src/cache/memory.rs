//! In-memory tile store using moka.
//!
//! Used for tests and for pipelines that run without a cache directory.
//! Entries are weighted by payload size and evicted LRU once the store
//! exceeds its capacity. Nothing survives a restart.

use std::time::Instant;

use chrono::Utc;
use moka::future::Cache as MokaCache;

use super::entry::CacheEntry;
use super::gate::StoreGate;
use super::traits::{BoxFuture, PurgeResult, StoreError, TileStore};
use crate::coord::TileIndex;

/// Volatile tile store backed by a moka cache.
pub struct MemoryTileStore {
    cache: MokaCache<TileIndex, CacheEntry>,
    max_size_bytes: u64,
    gate: StoreGate,
}

impl MemoryTileStore {
    /// Creates a store holding at most `max_size_bytes` of tile data.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            .weigher(|_key: &TileIndex, value: &CacheEntry| -> u32 {
                value.data().len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();

        Self {
            cache,
            max_size_bytes,
            gate: StoreGate::new(),
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}

impl TileStore for MemoryTileStore {
    fn get<'a>(
        &'a self,
        index: &'a TileIndex,
    ) -> BoxFuture<'a, Result<Option<CacheEntry>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            Ok(self.cache.get(index).await)
        })
    }

    fn put(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            self.cache.insert(entry.index().clone(), entry).await;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            Ok(self.cache.remove(index).await.is_some())
        })
    }

    fn purge_expired(&self) -> BoxFuture<'_, Result<PurgeResult, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            let start = Instant::now();
            let now = Utc::now();

            let expired: Vec<_> = self
                .cache
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(key, entry)| (key, entry.data().len() as u64))
                .collect();

            let mut result = PurgeResult::default();
            for (key, size) in expired {
                if self.cache.remove(key.as_ref()).await.is_some() {
                    result.entries_removed += 1;
                    result.bytes_freed += size;
                }
            }
            self.cache.run_pending_tasks().await;

            result.duration_ms = start.elapsed().as_millis() as u64;
            Ok(result)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.gate.close().await;
            self.cache.run_pending_tasks().await;
            Ok(())
        })
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }
}
