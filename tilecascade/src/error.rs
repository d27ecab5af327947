//! Pipeline error taxonomy.
//!
//! A miss is not an error: providers report it as
//! [`Lookup::Miss`](crate::provider::Lookup::Miss). The variants here are
//! the failures a provider or the orchestrator can raise. The orchestrator
//! absorbs provider failures into misses; only [`TileError::Detached`]
//! ever reaches a caller of the request API.

use thiserror::Error;

use crate::cache::StoreError;
use crate::coord::TileIndex;
use crate::provider::ArchiveError;

/// Errors raised inside the tile pipeline.
#[derive(Debug, Error)]
pub enum TileError {
    /// Network fetch failed (HTTP error, timeout, malformed body).
    /// Never retried inside the pipeline.
    #[error("Fetch failed for {index}: {reason}")]
    TransientFetchFailure { index: TileIndex, reason: String },

    /// Cache store I/O failed.
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    /// Archive access failed.
    #[error("Archive failure: {0}")]
    Archive(#[from] ArchiveError),

    /// The pipeline has been torn down.
    #[error("Tile pipeline is detached")]
    Detached,
}

impl TileError {
    /// Creates a fetch failure for a tile.
    pub fn fetch_failed(index: &TileIndex, reason: impl Into<String>) -> Self {
        TileError::TransientFetchFailure {
            index: index.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_display() {
        let index = TileIndex::new("Mapnik", 10, 5, 5);
        let err = TileError::fetch_failed(&index, "HTTP 503");
        assert_eq!(err.to_string(), "Fetch failed for Mapnik/10/5/5: HTTP 503");
    }

    #[test]
    fn test_detached_display() {
        assert_eq!(TileError::Detached.to_string(), "Tile pipeline is detached");
    }

    #[test]
    fn test_from_store_error() {
        let err: TileError = StoreError::Closed.into();
        assert!(matches!(err, TileError::Storage(StoreError::Closed)));
    }
}
