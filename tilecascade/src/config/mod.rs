//! INI configuration file.
//!
//! The file lives at `~/.tilecascade/config.ini`. Every key is optional;
//! missing keys take the defaults shown by `tilecascade config init`.
//!
//! ```ini
//! [source]
//! name = Mapnik
//! url = https://tile.openstreetmap.org/{z}/{x}/{y}.png
//!
//! [cache]
//! max_size = 2GB
//! expiration = 7d
//!
//! [network]
//! lag_ms = 0
//! ```

mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    default_cache_dir, ApproximationSettings, ArchiveSettings, AssetsSettings, CacheSettings,
    ConfigFile, NetworkSettings, SourceSettings, DEFAULT_STALE_RETENTION,
};
pub use size::{
    format_duration, format_size, format_size_human, parse_duration, parse_size,
    DurationParseError, Size, SizeParseError,
};
