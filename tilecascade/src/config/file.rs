//! Loading and saving the configuration file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::parser::parse_ini;
use super::settings::ConfigFile;
use super::writer::to_config_string;
use crate::cache::ExpirationPolicy;
use crate::pipeline::PipelineConfig;
use crate::source::TileSource;

/// Errors reading, writing or interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid value for [{section}] {key} = '{value}': {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    DirectoryError(#[source] io::Error),
}

impl ConfigFile {
    /// Loads from the default location, falling back to defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Parses configuration from an INI string.
    pub fn parse(text: &str) -> Result<Self, ConfigFileError> {
        let ini =
            Ini::load_from_str(text).map_err(|e| ConfigFileError::ReadError(ini::Error::Parse(e)))?;
        parse_ini(&ini)
    }

    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Writes the configuration, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }
        fs::write(path, to_config_string(self))
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Creates the default file if it does not exist and returns its path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Renders the configuration as the INI text [`save_to`](Self::save_to) writes.
    pub fn to_ini_string(&self) -> String {
        to_config_string(self)
    }

    /// Builds the tile source described by the `[source]` section.
    pub fn tile_source(&self) -> Result<TileSource, ConfigFileError> {
        let s = &self.source;
        let mut builder = TileSource::builder(&s.name)
            .zoom_range(s.min_zoom, s.max_zoom)
            .tile_size(s.tile_size)
            .extension(&s.extension);
        for url in &s.urls {
            builder = builder.url_template(url);
        }
        builder.build().map_err(|e| ConfigFileError::InvalidValue {
            section: "source".to_string(),
            key: "name".to_string(),
            value: s.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Converts the file into a [`PipelineConfig`].
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, ConfigFileError> {
        let mut config = PipelineConfig::new(self.tile_source()?)
            .with_cache_dir(&self.cache.directory)
            .with_network_timeout(self.network.timeout)
            .with_lag(Duration::from_millis(self.network.lag_ms))
            .with_approximation(self.approximation.enabled, self.approximation.max_depth)
            .with_use_data_connection(self.network.use_data_connection);

        config.cache_max_size = self.cache.max_size;
        config.purge_interval = self.cache.purge_interval;
        config.stale_retention = self.cache.stale_retention;
        config.expiration = ExpirationPolicy::new(self.cache.expiration)
            .with_override(self.cache.override_expiration);
        config.max_concurrent_downloads = self.network.max_concurrent;
        config.user_agent = self.network.user_agent.clone();
        config.archive_dir = self.archive.directory.clone();
        config.archive_tile_dirs = self.archive.tile_dirs.clone();
        config.assets_dir = self.assets.directory.clone();
        Ok(config)
    }
}

/// `~/.tilecascade`
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilecascade")
}

/// `~/.tilecascade/config.ini`
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.source.name = "Topo".to_string();
        config.source.urls = vec![
            "https://a.example/{z}/{x}/{y}.png".to_string(),
            "https://b.example/{z}/{x}/{y}.png".to_string(),
        ];
        config.cache.directory = temp.path().join("cache");
        config.cache.max_size = 256 * 1024 * 1024;
        config.cache.override_expiration = Some(Duration::from_secs(3600));
        config.network.lag_ms = 1500;
        config.network.use_data_connection = false;
        config.approximation.max_depth = 2;
        config.archive.directory = Some(temp.path().join("archives"));
        config.archive.tile_dirs = vec![temp.path().join("export"), temp.path().join("more")];

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_offline_source_round_trips() {
        let mut config = ConfigFile::default();
        config.source.urls.clear();
        let parsed = ConfigFile::parse(&config.to_ini_string()).unwrap();
        assert!(parsed.source.urls.is_empty());
        assert!(parsed.tile_source().unwrap().is_offline());
    }

    #[test]
    fn test_to_pipeline_config() {
        let config = ConfigFile::parse(
            "[source]\nname = Topo\nmax_zoom = 12\n\
             [cache]\ndirectory = /tmp/tc\nexpiration = 1d\noverride_expiration = 2h\n\
             [network]\nlag_ms = 250\nmax_concurrent = 3\n\
             [approximation]\nenabled = false\n",
        )
        .unwrap();
        let pipeline = config.to_pipeline_config().unwrap();

        assert_eq!(pipeline.source.name(), "Topo");
        assert_eq!(pipeline.source.max_zoom(), 12);
        assert_eq!(pipeline.cache_dir, Some(PathBuf::from("/tmp/tc")));
        assert_eq!(pipeline.lag, Duration::from_millis(250));
        assert_eq!(pipeline.max_concurrent_downloads, 3);
        assert!(!pipeline.approximation_enabled);
        assert_eq!(
            pipeline.expiration.default_lifetime(),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            pipeline.expiration.override_lifetime(),
            Some(Duration::from_secs(7200))
        );
    }

    #[test]
    fn test_invalid_source_is_reported() {
        let config = ConfigFile::parse("[source]\nmin_zoom = 10\nmax_zoom = 5\n").unwrap();
        assert!(matches!(
            config.to_pipeline_config(),
            Err(ConfigFileError::InvalidValue { section, .. }) if section == "source"
        ));
    }

    #[test]
    fn test_paths() {
        assert!(config_file_path().starts_with(config_directory()));
        assert!(config_file_path().ends_with("config.ini"));
    }
}
