//! Approximate tiles from coarser zoom levels.
//!
//! When a tile is not available locally, a coarser ancestor often is. The
//! region of the ancestor covering the requested tile is cropped out and
//! scaled back up to full tile size:
//!
//! ```text
//!  ancestor (zoom z-1)          requested tile (zoom z)
//!  ┌─────────┬─────────┐        ┌───────────────────┐
//!  │         │         │        │                   │
//!  │         │  crop   │  ───►  │  nearest-neighbour│
//!  ├─────────┼─────────┤        │  upscale x2       │
//!  │         │         │        │                   │
//!  └─────────┴─────────┘        └───────────────────┘
//! ```
//!
//! Each level up halves the usable span, so the search is bounded by a
//! maximum depth and stops as soon as the span drops below one pixel.
//! This module never touches the network and never writes.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::imageops::FilterType;
use image::ImageFormat;
use tracing::debug;

use super::types::{Lookup, ModuleKind, TileModule};
use crate::cache::BoxFuture;
use crate::coord::TileIndex;
use crate::error::TileError;
use crate::source::TileSource;

/// Default number of zoom levels searched upwards.
pub const DEFAULT_MAX_DEPTH: u8 = 4;

/// Builds approximations from ancestor tiles found in other modules.
pub struct ApproximationProvider {
    source: Arc<TileSource>,
    sources: Vec<Arc<dyn TileModule>>,
    max_depth: u8,
    levels_inspected: AtomicU64,
}

impl ApproximationProvider {
    /// Creates a provider reading ancestors from `sources`, in order.
    ///
    /// `sources` are typically the cache and archive modules.
    pub fn new(source: Arc<TileSource>, sources: Vec<Arc<dyn TileModule>>, max_depth: u8) -> Self {
        Self {
            source,
            sources,
            max_depth,
            levels_inspected: AtomicU64::new(0),
        }
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Total ancestor levels looked at across all lookups.
    pub fn levels_inspected(&self) -> u64 {
        self.levels_inspected.load(Ordering::Relaxed)
    }

    /// Looks up `ancestor` in each source, in order.
    async fn find_ancestor(&self, ancestor: &TileIndex) -> Option<Bytes> {
        for module in &self.sources {
            match module.load(ancestor).await {
                Ok(Lookup::Exact(data)) | Ok(Lookup::Approximate(data)) => return Some(data),
                Ok(Lookup::Miss) => {}
                Err(e) => {
                    debug!(tile = %ancestor, module = module.name(), error = %e, "Ancestor lookup failed");
                }
            }
        }
        None
    }
}

impl TileModule for ApproximationProvider {
    fn name(&self) -> &str {
        "approximation"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Approximation
    }

    fn load<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<Lookup, TileError>> {
        Box::pin(async move {
            let tile_size = self.source.tile_size();

            for level in 1..=self.max_depth {
                if level > index.zoom() || index.zoom() - level < self.source.min_zoom() {
                    break;
                }
                if tile_size >> level == 0 {
                    break;
                }
                let Some(ancestor) = index.ancestor(level) else {
                    break;
                };
                self.levels_inspected.fetch_add(1, Ordering::Relaxed);

                let Some(data) = self.find_ancestor(&ancestor).await else {
                    continue;
                };

                let offset = index.offset_in_ancestor(level);
                let scaled = tokio::task::spawn_blocking(move || {
                    crop_and_scale(&data, level, offset, tile_size)
                })
                .await;

                match scaled {
                    Ok(Ok(bytes)) => {
                        debug!(tile = %index, ancestor = %ancestor, level, "Approximation built");
                        return Ok(Lookup::Approximate(bytes));
                    }
                    Ok(Err(e)) => {
                        debug!(tile = %ancestor, error = %e, "Ancestor undecodable, skipping");
                    }
                    Err(e) => {
                        debug!(tile = %ancestor, error = %e, "Approximation task failed");
                    }
                }
            }
            Ok(Lookup::Miss)
        })
    }
}

/// Crops the part of an ancestor image covering a descendant `level`
/// zooms down and scales it to `tile_size`, encoded as PNG.
///
/// `offset` is the descendant's position inside the ancestor in units of
/// descendant tiles.
pub fn crop_and_scale(
    ancestor: &[u8],
    level: u8,
    offset: (u32, u32),
    tile_size: u32,
) -> Result<Bytes, image::ImageError> {
    let image = image::load_from_memory(ancestor)?;
    let span_w = image.width() >> level;
    let span_h = image.height() >> level;
    if span_w == 0 || span_h == 0 {
        return Err(image::ImageError::Parameter(
            image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ),
        ));
    }

    let cropped = image.crop_imm(offset.0 * span_w, offset.1 * span_h, span_w, span_h);
    let scaled = cropped.resize_exact(tile_size, tile_size, FilterType::Nearest);

    let mut out = Cursor::new(Vec::new());
    scaled.write_to(&mut out, ImageFormat::Png)?;
    Ok(Bytes::from(out.into_inner()))
}
