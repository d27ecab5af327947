//! Coordinate type definitions

use std::fmt;
use std::sync::Arc;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Slippy-map zoom bounds. 29 keeps `x`/`y` within `u32` and matches
/// the deepest level any common tile server publishes.
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 29;

/// Identifies one tile of one tile source.
///
/// Equality and hashing are by value over all four fields, so a
/// `TileIndex` is directly usable as a deduplication and cache key.
/// Cloning is cheap: the source name is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    /// Tile source name (e.g. "Mapnik")
    source: Arc<str>,
    /// Zoom level
    zoom: u8,
    /// X coordinate (west to east)
    x: u32,
    /// Y coordinate (north to south)
    y: u32,
}

impl TileIndex {
    /// Creates a tile index.
    ///
    /// No range check is performed; use [`TileIndex::is_valid`] when the
    /// coordinate comes from untrusted input.
    pub fn new(source: impl Into<Arc<str>>, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            zoom,
            x,
            y,
        }
    }

    /// Creates a tile index, rejecting coordinates outside the zoom grid.
    pub fn checked(
        source: impl Into<Arc<str>>,
        zoom: u8,
        x: u32,
        y: u32,
    ) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let index = Self::new(source, zoom, x, y);
        if !index.is_valid() {
            return Err(CoordError::OutOfGrid { zoom, x, y });
        }
        Ok(index)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Number of tiles along one axis at this zoom level.
    #[inline]
    pub fn grid_size(zoom: u8) -> u64 {
        1u64 << zoom
    }

    /// Returns true if the zoom is supported and x/y fall inside the grid.
    pub fn is_valid(&self) -> bool {
        self.zoom <= MAX_ZOOM
            && (self.x as u64) < Self::grid_size(self.zoom)
            && (self.y as u64) < Self::grid_size(self.zoom)
    }

    /// Returns the tile `levels` zoom levels coarser that covers this tile.
    ///
    /// Returns `None` if that would go below zoom 0. `ancestor(0)` is the
    /// tile itself.
    pub fn ancestor(&self, levels: u8) -> Option<TileIndex> {
        if levels > self.zoom {
            return None;
        }
        Some(Self {
            source: Arc::clone(&self.source),
            zoom: self.zoom - levels,
            x: self.x >> levels,
            y: self.y >> levels,
        })
    }

    /// Returns the direct parent tile, or `None` at zoom 0.
    pub fn parent(&self) -> Option<TileIndex> {
        self.ancestor(1)
    }

    /// Position of this tile inside its ancestor `levels` up, in units of
    /// this tile's own size.
    ///
    /// Both components are in `0..2^levels`.
    pub fn offset_in_ancestor(&self, levels: u8) -> (u32, u32) {
        let mask = (1u32 << levels) - 1;
        (self.x & mask, self.y & mask)
    }

    /// Bing-style quadkey for this tile.
    ///
    /// Zoom 0 has the empty quadkey.
    pub fn quadkey(&self) -> String {
        let mut quadkey = String::with_capacity(self.zoom as usize);
        for i in (1..=self.zoom).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            quadkey.push(digit as char);
        }
        quadkey
    }

    /// Returns the same coordinate for a different tile source.
    pub fn with_source(&self, source: impl Into<Arc<str>>) -> TileIndex {
        Self {
            source: source.into(),
            zoom: self.zoom,
            x: self.x,
            y: self.y,
        }
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.source, self.zoom, self.x, self.y)
    }
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Latitude is outside valid range (-85.05112878 to 85.05112878)
    InvalidLatitude(f64),
    /// Longitude is outside valid range (-180.0 to 180.0)
    InvalidLongitude(f64),
    /// Zoom level is outside valid range (0 to 29)
    InvalidZoom(u8),
    /// x or y is not inside the grid of its zoom level
    OutOfGrid { zoom: u8, x: u32, y: u32 },
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLatitude(lat) => {
                write!(
                    f,
                    "Invalid latitude: {} (must be between {} and {})",
                    lat, MIN_LAT, MAX_LAT
                )
            }
            CoordError::InvalidLongitude(lon) => {
                write!(
                    f,
                    "Invalid longitude: {} (must be between {} and {})",
                    lon, MIN_LON, MAX_LON
                )
            }
            CoordError::InvalidZoom(zoom) => {
                write!(
                    f,
                    "Invalid zoom level: {} (must be between {} and {})",
                    zoom, MIN_ZOOM, MAX_ZOOM
                )
            }
            CoordError::OutOfGrid { zoom, x, y } => {
                write!(
                    f,
                    "Tile ({}, {}) is outside the zoom {} grid (max {})",
                    x,
                    y,
                    zoom,
                    TileIndex::grid_size(*zoom) - 1
                )
            }
        }
    }
}

impl std::error::Error for CoordError {}
