//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::ExpirationPolicy;
use crate::provider::{
    DownloaderConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_DEPTH,
    DEFAULT_USER_AGENT,
};
use crate::source::TileSource;

/// Default disk cache size: 2 GB.
pub const DEFAULT_CACHE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Default in-memory store size when no cache directory is configured.
pub const DEFAULT_MEMORY_CACHE_SIZE: u64 = 64 * 1024 * 1024;

/// Default interval between cache maintenance cycles.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Everything needed to assemble a tile pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: TileSource,

    /// Bundled assets; skipped when `None`.
    pub assets_dir: Option<PathBuf>,

    /// Disk cache location; an in-memory store is used when `None`.
    pub cache_dir: Option<PathBuf>,
    pub cache_max_size: u64,
    pub purge_interval: Duration,
    /// Expired entries younger than this survive purging as stale fallbacks.
    pub stale_retention: Duration,
    pub expiration: ExpirationPolicy,

    /// Directory scanned for `*.mbtiles`; skipped when `None`.
    pub archive_dir: Option<PathBuf>,
    /// Unpacked tile trees served as archives.
    pub archive_tile_dirs: Vec<PathBuf>,

    pub approximation_enabled: bool,
    pub max_approximation_depth: u8,

    pub network_timeout: Duration,
    /// Artificial delay before each download.
    pub lag: Duration,
    pub max_concurrent_downloads: usize,
    pub user_agent: String,
    pub use_data_connection: bool,
}

impl PipelineConfig {
    pub fn new(source: TileSource) -> Self {
        Self {
            source,
            assets_dir: None,
            cache_dir: None,
            cache_max_size: DEFAULT_CACHE_SIZE,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            stale_retention: Duration::from_secs(30 * 24 * 60 * 60),
            expiration: ExpirationPolicy::default(),
            archive_dir: None,
            archive_tile_dirs: Vec::new(),
            approximation_enabled: true,
            max_approximation_depth: DEFAULT_MAX_DEPTH,
            network_timeout: DEFAULT_FETCH_TIMEOUT,
            lag: Duration::ZERO,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_data_connection: true,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    pub fn with_archive_tile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_tile_dirs.push(dir.into());
        self
    }

    pub fn with_lag(mut self, lag: Duration) -> Self {
        self.lag = lag;
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_approximation(mut self, enabled: bool, max_depth: u8) -> Self {
        self.approximation_enabled = enabled;
        self.max_approximation_depth = max_depth;
        self
    }

    pub fn with_use_data_connection(mut self, enabled: bool) -> Self {
        self.use_data_connection = enabled;
        self
    }

    /// Settings for the network downloader.
    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig {
            lag: self.lag,
            timeout: self.network_timeout,
            max_concurrent: self.max_concurrent_downloads,
            expiration: self.expiration.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(TileSource::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.source.name(), "Mapnik");
        assert!(config.cache_dir.is_none());
        assert!(config.approximation_enabled);
        assert_eq!(config.max_approximation_depth, DEFAULT_MAX_DEPTH);
        assert!(config.use_data_connection);
    }

    #[test]
    fn test_downloader_config() {
        let config = PipelineConfig::default()
            .with_lag(Duration::from_millis(1000))
            .with_network_timeout(Duration::from_secs(5));
        let dl = config.downloader_config();
        assert_eq!(dl.lag, Duration::from_millis(1000));
        assert_eq!(dl.timeout, Duration::from_secs(5));
        assert_eq!(dl.max_concurrent, DEFAULT_MAX_CONCURRENT_DOWNLOADS);
    }
}
