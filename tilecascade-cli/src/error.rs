//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use tilecascade::config::ConfigFileError;
use tilecascade::coord::CoordError;
use tilecascade::pipeline::BuildError;
use tilecascade::TileError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Invalid tile coordinates
    Coordinates(CoordError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to assemble the tile pipeline
    PipelineBuild(BuildError),
    /// The pipeline rejected a request
    Request(TileError),
    /// No provider could supply the tile
    TileUnavailable(String),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::TileUnavailable(_) = self {
            eprintln!();
            eprintln!("The tile was not in the cache, assets or archives and could not be");
            eprintln!("downloaded. Check connectivity, or run without --offline.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Coordinates(e) => write!(f, "Invalid coordinates: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::PipelineBuild(e) => write!(f, "Failed to create tile pipeline: {}", e),
            CliError::Request(e) => write!(f, "Tile request failed: {}", e),
            CliError::TileUnavailable(tile) => write!(f, "Tile {} is unavailable", tile),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Coordinates(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::PipelineBuild(e) => Some(e),
            CliError::Request(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::PipelineBuild(e)
    }
}

impl From<TileError> for CliError {
    fn from(e: TileError) -> Self {
        CliError::Request(e)
    }
}

impl From<CoordError> for CliError {
    fn from(e: CoordError) -> Self {
        CliError::Coordinates(e)
    }
}
