//! Persistent tile cache.
//!
//! The [`TileStore`] trait abstracts a durable key → tile bytes store with
//! expiration metadata. Two backends are provided:
//!
//! - [`DiskTileStore`]: one file per tile, with a maintenance daemon that
//!   purges expired entries and trims the store to its size limit
//! - [`MemoryTileStore`]: moka-backed, for tests and cache-less pipelines
//!
//! Expiration timestamps for new entries come from [`ExpirationPolicy`].

mod disk;
mod entry;
mod expiration;
mod gate;
mod memory;
mod traits;

pub use disk::{clear_directory, disk_stats, DiskStats, DiskStoreConfig, DiskTileStore};
pub use entry::CacheEntry;
pub use expiration::{
    parse_http_date, parse_max_age, ExpirationPolicy, Freshness, DEFAULT_TILE_LIFETIME,
};
pub use memory::MemoryTileStore;
pub use traits::{BoxFuture, PurgeResult, StoreError, TileStore};
