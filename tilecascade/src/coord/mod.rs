//! Tile coordinates.
//!
//! [`TileIndex`] names a tile of a given source in the Web Mercator
//! slippy-map grid, and doubles as the key for request deduplication and
//! cache lookups. This module also converts geographic coordinates into
//! tile indices.

mod types;

pub use types::{CoordError, TileIndex, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM};

use std::f64::consts::PI;
use std::sync::Arc;

/// Converts geographic coordinates to the tile containing them.
///
/// # Arguments
///
/// * `source` - Tile source name carried by the resulting index
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 29)
#[inline]
pub fn to_tile_index(
    source: impl Into<Arc<str>>,
    lat: f64,
    lon: f64,
    zoom: u8,
) -> Result<TileIndex, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = TileIndex::grid_size(zoom) as f64;
    let max = TileIndex::grid_size(zoom) - 1;

    // lon = 180.0 lands exactly on the east edge; clamp into the last column
    let x = (((lon + 180.0) / 360.0 * n) as u64).min(max) as u32;

    let lat_rad = lat * PI / 180.0;
    let y = (((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u64).min(max) as u32;

    Ok(TileIndex::new(source, zoom, x, y))
}

/// Returns the latitude/longitude of a tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileIndex) -> (f64, f64) {
    let n = TileIndex::grid_size(tile.zoom()) as f64;

    let lon = tile.x() as f64 / n * 360.0 - 180.0;

    let y = tile.y() as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}
