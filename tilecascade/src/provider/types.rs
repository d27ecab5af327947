//! Provider types and traits

use std::fmt;

use bytes::Bytes;

use crate::cache::BoxFuture;
use crate::coord::TileIndex;
use crate::error::TileError;

/// Outcome of asking one module for a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The tile itself.
    Exact(Bytes),
    /// A stand-in for the tile: an upscaled ancestor or an expired copy.
    Approximate(Bytes),
    /// This module has nothing for the tile.
    Miss,
}

impl Lookup {
    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }
}

/// Role of a module in the provider chain.
///
/// The orchestrator uses the kind for policy decisions, e.g. skipping
/// approximation once an interim result exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Assets,
    Cache,
    Archive,
    Approximation,
    Network,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::Assets => "assets",
            ModuleKind::Cache => "cache",
            ModuleKind::Archive => "archive",
            ModuleKind::Approximation => "approximation",
            ModuleKind::Network => "network",
        };
        f.write_str(name)
    }
}

/// One source of tiles in the provider chain.
///
/// Implementations must be cheap to call concurrently for different
/// tiles; the orchestrator never calls `load` twice at once for the same
/// tile.
pub trait TileModule: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    fn kind(&self) -> ModuleKind;

    /// True if this module needs connectivity. Such modules are skipped
    /// while the pipeline is degraded.
    fn requires_network(&self) -> bool {
        false
    }

    /// Looks up a tile.
    ///
    /// A missing tile is `Ok(Lookup::Miss)`, not an error.
    fn load<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<Lookup, TileError>>;

    /// Releases the module's resources. Called once on pipeline teardown.
    ///
    /// Network modules are detached while workers may still be inside
    /// `load`; they must let started loads finish. Every other module is
    /// detached after the last worker exits.
    fn detach(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Errors from the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// HTTP request failed
    HttpError(String),
    /// Server answered with a non-success status
    HttpStatus { status: u16, url: String },
    /// Client could not be built
    ClientBuild(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::HttpError(msg) => write!(f, "HTTP error: {}", msg),
            ProviderError::HttpStatus { status, url } => {
                write!(f, "HTTP {} from {}", status, url)
            }
            ProviderError::ClientBuild(msg) => {
                write!(f, "Failed to create HTTP client: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProviderError {}
