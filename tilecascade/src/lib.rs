//! tilecascade - layered map tile resolution.
//!
//! A request for a tile walks an ordered chain of providers (bundled
//! assets, a persistent cache, offline archives, ancestor-tile
//! approximation and finally the network) until one of them answers.
//! Concurrent requests for the same tile share a single resolution, and
//! providers that need the network are skipped while it is unavailable.
//!
//! The entry point is [`pipeline::PipelineBuilder`], which assembles a
//! [`pipeline::ProviderArray`] from a [`pipeline::PipelineConfig`].

pub mod cache;
pub mod config;
pub mod coord;
pub mod error;
pub mod logging;
pub mod network;
pub mod pipeline;
pub mod provider;
pub mod source;

/// Crate version, as recorded in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use coord::TileIndex;
pub use error::TileError;
pub use source::TileSource;
