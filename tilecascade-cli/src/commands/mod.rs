//! CLI command implementations.
//!
//! - [`cache`] - Disk cache management (stats, purge, clear)
//! - [`config`] - Configuration file management (init, show, path)
//! - [`fetch`] - Resolve a single tile through the provider chain

pub mod cache;
pub mod config;
pub mod fetch;
