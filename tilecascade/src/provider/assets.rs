//! Bundled tile assets.
//!
//! Tiles shipped with the application, laid out as
//! `{root}/{source}/{z}/{x}/{y}{ext}`. Read-only.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::types::{Lookup, ModuleKind, TileModule};
use crate::cache::BoxFuture;
use crate::coord::TileIndex;
use crate::error::TileError;
use crate::source::TileSource;

/// Serves tiles from a bundled asset directory.
pub struct AssetsProvider {
    source: Arc<TileSource>,
    root: PathBuf,
}

impl AssetsProvider {
    pub fn new(source: Arc<TileSource>, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
        }
    }

    fn path_for(&self, index: &TileIndex) -> PathBuf {
        self.root.join(self.source.relative_path(index))
    }
}

impl TileModule for AssetsProvider {
    fn name(&self) -> &str {
        "assets"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Assets
    }

    fn load<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<Lookup, TileError>> {
        Box::pin(async move {
            if index.source() != self.source.name() {
                return Ok(Lookup::Miss);
            }
            let path = self.path_for(index);
            match tokio::fs::read(&path).await {
                Ok(data) if !data.is_empty() => Ok(Lookup::Exact(Bytes::from(data))),
                Ok(_) => Ok(Lookup::Miss),
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        debug!(tile = %index, path = %path.display(), error = %e, "Asset unreadable");
                    }
                    Ok(Lookup::Miss)
                }
            }
        })
    }
}
