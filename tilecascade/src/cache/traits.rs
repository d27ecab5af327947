//! Core traits for the persistent tile store.
//!
//! The `TileStore` trait is the one mutable shared resource of a tile
//! pipeline. Providers read from it, only the network downloader writes
//! to it, and the orchestrator closes it on teardown.
//!
//! # Design Principles
//!
//! - **Typed keys**: entries are keyed by [`TileIndex`], the same key used
//!   for request deduplication
//! - **Corruption is a miss**: a damaged entry reads as absent, never as
//!   an error, so one bad file cannot break tile resolution
//! - **Independent writes**: writes to different keys never contend;
//!   writes to the same key are last-writer-wins with no torn reads
//! - **Dyn-compatible**: uses `Pin<Box<dyn Future>>` so the store can be
//!   shared as `Arc<dyn TileStore>`

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use super::entry::CacheEntry;
use crate::coord::TileIndex;

/// Result of an expiry purge or size trim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeResult {
    /// Number of entries removed.
    pub entries_removed: usize,
    /// Total bytes freed.
    pub bytes_freed: u64,
    /// Duration of the operation in milliseconds.
    pub duration_ms: u64,
}

impl fmt::Display for PurgeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Purge: removed {} entries, freed {} bytes in {}ms",
            self.entries_removed, self.bytes_freed, self.duration_ms
        )
    }
}

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while writing or maintaining the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has been closed.
    #[error("Tile store is closed")]
    Closed,

    /// Entry header could not be encoded.
    #[error("Failed to encode entry: {0}")]
    Encode(String),

    /// Failed to spawn background task.
    #[error("Failed to spawn task: {0}")]
    SpawnError(String),
}

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable key → tile bytes store with expiration bookkeeping.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` for use across async tasks.
pub trait TileStore: Send + Sync {
    /// Looks up a tile.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(entry))` if an intact entry exists, expired or not
    /// - `Ok(None)` if absent, corrupt or unreadable
    /// - `Err(StoreError::Closed)` after [`TileStore::close`]
    fn get<'a>(
        &'a self,
        index: &'a TileIndex,
    ) -> BoxFuture<'a, Result<Option<CacheEntry>, StoreError>>;

    /// Stores a tile, replacing any previous entry for the same index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if I/O fails or the store is closed. Callers
    /// treat a failed write as "not cached".
    fn put(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Removes a tile.
    ///
    /// Returns `Ok(true)` if an entry existed.
    fn remove<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Removes expired entries.
    ///
    /// Safe to run concurrently with reads and writes: a reader sees either
    /// the entry or a miss, never a partial entry.
    fn purge_expired(&self) -> BoxFuture<'_, Result<PurgeResult, StoreError>>;

    /// Flushes pending writes and closes the store.
    ///
    /// Waits for in-progress operations to finish. Every later operation
    /// fails with [`StoreError::Closed`]. Closing twice is a no-op.
    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Approximate number of stored entries.
    fn entry_count(&self) -> u64;

    /// Approximate stored size in bytes.
    fn size_bytes(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_result_default() {
        let result = PurgeResult::default();
        assert_eq!(result.entries_removed, 0);
        assert_eq!(result.bytes_freed, 0);
        assert_eq!(result.duration_ms, 0);
    }

    #[test]
    fn test_purge_result_display() {
        let result = PurgeResult {
            entries_removed: 10,
            bytes_freed: 1024,
            duration_ms: 50,
        };
        let display = format!("{}", result);
        assert!(display.contains("10"));
        assert!(display.contains("1024"));
        assert!(display.contains("50ms"));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::Closed.to_string(), "Tile store is closed");
    }

    #[test]
    fn test_store_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
