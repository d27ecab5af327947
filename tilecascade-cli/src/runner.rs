//! CLI runner for common setup.
//!
//! Loads the configuration file and initializes logging so command
//! handlers don't repeat it.

use std::path::{Path, PathBuf};

use tracing::info;

use tilecascade::config::{config_file_path, ConfigFile};
use tilecascade::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};

use crate::error::CliError;

/// Holds the loaded configuration and keeps logging alive.
pub struct CliRunner {
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Loads `config_path` (or the default file) and starts logging.
    ///
    /// Console logging is enabled only when `verbose` is set so that
    /// command output stays readable.
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path);
        let config = ConfigFile::load_from(&config_path)?;

        let logging_guard = init_logging(&default_log_dir(), default_log_file(), verbose)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("tilecascade v{}", tilecascade::VERSION);
        info!(
            config = %self.config_path.display(),
            "tilecascade CLI: {} command",
            command
        );
    }
}

/// The file named on the command line, or the default location.
pub fn resolve_config_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path)
}
