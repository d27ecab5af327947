//! Tile source descriptions.
//!
//! A [`TileSource`] says how tiles of one imagery layer are named and
//! located: which zoom levels exist, how large a tile is, how a tile index
//! maps to a download URL, and which file extension stored tiles carry.
//!
//! Sources are immutable once built and are shared as `Arc<TileSource>`
//! by every provider of a pipeline.
//!
//! # URL templates
//!
//! Templates are plain strings with placeholders:
//!
//! | Placeholder | Replaced with |
//! |-------------|---------------|
//! | `{z}`       | zoom level    |
//! | `{x}`       | tile column   |
//! | `{y}`       | tile row      |
//! | `{q}`       | quadkey       |
//! | `{s}`       | template slot (0-based) |
//!
//! ```
//! use tilecascade::source::TileSource;
//!
//! let source = TileSource::builder("Mapnik")
//!     .url_template("https://tile.openstreetmap.org/{z}/{x}/{y}.png")
//!     .build()
//!     .unwrap();
//! let tile = source.index(10, 547, 380);
//! assert_eq!(source.url_for(&tile), "https://tile.openstreetmap.org/10/547/380.png");
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::coord::{TileIndex, MAX_ZOOM};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default file extension for stored tiles.
pub const DEFAULT_EXTENSION: &str = ".png";

/// Errors raised while building a tile source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Source name is empty or contains a path separator
    InvalidName(String),
    /// min_zoom > max_zoom, or max_zoom above the supported maximum
    InvalidZoomRange { min: u8, max: u8 },
    /// Tile size is zero or not a power of two
    InvalidTileSize(u32),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::InvalidName(name) => {
                write!(f, "Invalid tile source name '{}'", name)
            }
            SourceError::InvalidZoomRange { min, max } => {
                write!(
                    f,
                    "Invalid zoom range {}..={} (must satisfy min <= max <= {})",
                    min, max, MAX_ZOOM
                )
            }
            SourceError::InvalidTileSize(size) => {
                write!(f, "Invalid tile size {} (must be a power of two)", size)
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Immutable description of a tile source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSource {
    name: Arc<str>,
    min_zoom: u8,
    max_zoom: u8,
    tile_size: u32,
    url_templates: Vec<String>,
    extension: String,
}

impl TileSource {
    /// Starts building a source with the given name.
    pub fn builder(name: impl Into<String>) -> TileSourceBuilder {
        TileSourceBuilder::new(name)
    }

    /// The standard OpenStreetMap "Mapnik" layer.
    pub fn mapnik() -> Self {
        Self {
            name: Arc::from("Mapnik"),
            min_zoom: 0,
            max_zoom: 19,
            tile_size: DEFAULT_TILE_SIZE,
            url_templates: vec!["https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string()],
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn url_templates(&self) -> &[String] {
        &self.url_templates
    }

    /// Checks if this source publishes tiles at the given zoom level.
    pub fn supports_zoom(&self, zoom: u8) -> bool {
        zoom >= self.min_zoom && zoom <= self.max_zoom
    }

    /// Creates an index for a tile of this source.
    pub fn index(&self, zoom: u8, x: u32, y: u32) -> TileIndex {
        TileIndex::new(Arc::clone(&self.name), zoom, x, y)
    }

    /// Returns the download URL for a tile.
    ///
    /// With several templates the slot is chosen by `(x + y) % n`, which
    /// spreads neighbouring tiles across mirrors while keeping the choice
    /// stable for a given tile.
    pub fn url_for(&self, index: &TileIndex) -> String {
        if self.url_templates.is_empty() {
            return String::new();
        }
        let slot = ((index.x() as u64 + index.y() as u64) % self.url_templates.len() as u64)
            as usize;
        let template = &self.url_templates[slot];

        let mut url = template
            .replace("{z}", &index.zoom().to_string())
            .replace("{x}", &index.x().to_string())
            .replace("{y}", &index.y().to_string())
            .replace("{s}", &slot.to_string());
        if url.contains("{q}") {
            url = url.replace("{q}", &index.quadkey());
        }
        url
    }

    /// Relative storage path of a tile: `{name}/{z}/{x}/{y}{ext}`.
    pub fn relative_path(&self, index: &TileIndex) -> PathBuf {
        PathBuf::from(self.name.as_ref())
            .join(index.zoom().to_string())
            .join(index.x().to_string())
            .join(format!("{}{}", index.y(), self.extension))
    }

    /// True when no URL template is configured, i.e. the source is
    /// offline-only.
    pub fn is_offline(&self) -> bool {
        self.url_templates.is_empty()
    }
}

impl Default for TileSource {
    fn default() -> Self {
        Self::mapnik()
    }
}

/// Builder for [`TileSource`].
#[derive(Debug, Clone)]
pub struct TileSourceBuilder {
    name: String,
    min_zoom: u8,
    max_zoom: u8,
    tile_size: u32,
    url_templates: Vec<String>,
    extension: String,
}

impl TileSourceBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_zoom: 0,
            max_zoom: 19,
            tile_size: DEFAULT_TILE_SIZE,
            url_templates: Vec::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn zoom_range(mut self, min: u8, max: u8) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    pub fn tile_size(mut self, size: u32) -> Self {
        self.tile_size = size;
        self
    }

    /// Adds a URL template. May be called repeatedly for mirrors.
    pub fn url_template(mut self, template: impl Into<String>) -> Self {
        self.url_templates.push(template.into());
        self
    }

    /// Sets the stored-file extension. A missing leading dot is added.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = if extension.is_empty() || extension.starts_with('.') {
            extension
        } else {
            format!(".{}", extension)
        };
        self
    }

    pub fn build(self) -> Result<TileSource, SourceError> {
        if self.name.trim().is_empty()
            || self.name.contains('/')
            || self.name.contains('\\')
            || self.name == ".."
        {
            return Err(SourceError::InvalidName(self.name));
        }
        if self.min_zoom > self.max_zoom || self.max_zoom > MAX_ZOOM {
            return Err(SourceError::InvalidZoomRange {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if self.tile_size == 0 || !self.tile_size.is_power_of_two() {
            return Err(SourceError::InvalidTileSize(self.tile_size));
        }

        Ok(TileSource {
            name: Arc::from(self.name),
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            tile_size: self.tile_size,
            url_templates: self.url_templates,
            extension: self.extension,
        })
    }
}
