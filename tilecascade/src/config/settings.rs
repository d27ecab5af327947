//! Configuration structures, one per INI section.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_TILE_LIFETIME;
use crate::pipeline::{DEFAULT_CACHE_SIZE, DEFAULT_PURGE_INTERVAL};
use crate::provider::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_DOWNLOADS, DEFAULT_MAX_DEPTH, DEFAULT_USER_AGENT,
};
use crate::source::TileSource;

/// Default retention for expired entries kept as stale fallbacks.
pub const DEFAULT_STALE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Complete configuration file contents.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub network: NetworkSettings,
    pub approximation: ApproximationSettings,
    pub archive: ArchiveSettings,
    pub assets: AssetsSettings,
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub name: String,
    /// URL templates; empty means offline.
    pub urls: Vec<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_size: u32,
    pub extension: String,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub max_size: u64,
    /// Lifetime applied when the server gives no freshness headers.
    pub expiration: Duration,
    /// Lifetime applied regardless of server headers.
    pub override_expiration: Option<Duration>,
    /// Zero disables background maintenance.
    pub purge_interval: Duration,
    pub stale_retention: Duration,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub timeout: Duration,
    /// Delay injected before every download, in milliseconds.
    pub lag_ms: u64,
    pub max_concurrent: usize,
    pub user_agent: String,
    pub use_data_connection: bool,
}

/// `[approximation]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproximationSettings {
    pub enabled: bool,
    pub max_depth: u8,
}

/// `[archive]` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArchiveSettings {
    pub directory: Option<PathBuf>,
    /// Unpacked tile trees, queried before the MBTiles files.
    pub tile_dirs: Vec<PathBuf>,
}

/// `[assets]` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetsSettings {
    pub directory: Option<PathBuf>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        let mapnik = TileSource::mapnik();
        Self {
            name: mapnik.name().to_string(),
            urls: mapnik.url_templates().to_vec(),
            min_zoom: mapnik.min_zoom(),
            max_zoom: mapnik.max_zoom(),
            tile_size: mapnik.tile_size(),
            extension: mapnik.extension().to_string(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            max_size: DEFAULT_CACHE_SIZE,
            expiration: DEFAULT_TILE_LIFETIME,
            override_expiration: None,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            stale_retention: DEFAULT_STALE_RETENTION,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            lag_ms: 0,
            max_concurrent: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_data_connection: true,
        }
    }
}

impl Default for ApproximationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            cache: CacheSettings::default(),
            network: NetworkSettings::default(),
            approximation: ApproximationSettings::default(),
            archive: ArchiveSettings::default(),
            assets: AssetsSettings::default(),
        }
    }
}

/// Platform cache directory, e.g. `~/.cache/tilecascade` on Linux.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilecascade")
}
