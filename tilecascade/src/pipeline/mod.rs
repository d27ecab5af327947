//! Tile-resolution pipeline.
//!
//! [`ProviderArray`] resolves tile requests against an ordered chain of
//! [`TileModule`](crate::provider::TileModule)s, deduplicating concurrent
//! requests for the same tile and skipping the network while degraded.
//! [`PipelineBuilder`] assembles the standard chain from a
//! [`PipelineConfig`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilecascade::pipeline::{PipelineBuilder, PipelineConfig, TileDelivery};
//!
//! let config = PipelineConfig::default().with_cache_dir("/tmp/tiles");
//! let pipeline = PipelineBuilder::new(config).build().await?;
//!
//! let index = pipeline_source.index(12, 2200, 1343);
//! pipeline.request_tile(index, Arc::new(|delivery: TileDelivery| {
//!     // hand off to the UI thread
//! }))?;
//! ```

mod array;
mod builder;
mod config;
mod request;


pub use array::{PipelineStats, ProviderArray};
pub use builder::{BuildError, PipelineBuilder};
pub use config::{
    PipelineConfig, DEFAULT_CACHE_SIZE, DEFAULT_MEMORY_CACHE_SIZE, DEFAULT_PURGE_INTERVAL,
};
pub use request::{RequestHandle, RequestState, TileCallback, TileDelivery, TileResult};
