//! Serializes a [`ConfigFile`] to a commented INI document.

use super::settings::ConfigFile;
use super::size::{format_duration, format_size};

fn path_or_empty(path: &Option<std::path::PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"# tilecascade configuration
# Sizes accept KB, MB and GB suffixes. Durations accept ms, s, m, h and d.

[source]
# Name of the tile source; also the subdirectory used by the disk cache
name = {name}
# Comma-separated URL templates with {{z}}, {{x}}, {{y}} and optional {{q}} (quadkey)
# Leave empty for an offline source
url = {urls}
min_zoom = {min_zoom}
max_zoom = {max_zoom}
# Tile edge in pixels (power of two)
tile_size = {tile_size}
extension = {extension}

[cache]
directory = {cache_dir}
max_size = {max_size}
# Lifetime used when the server sends no freshness headers
expiration = {expiration}
# Lifetime applied regardless of server headers (empty to honour them)
override_expiration = {override_expiration}
# Interval between maintenance cycles (0 disables)
purge_interval = {purge_interval}
# How long expired tiles are kept as stale fallbacks
stale_retention = {stale_retention}

[network]
timeout = {timeout}
# Artificial delay before each download, for testing slow links
lag_ms = {lag_ms}
max_concurrent = {max_concurrent}
user_agent = {user_agent}
# When false the network provider is skipped even if online
use_data_connection = {use_data_connection}

[approximation]
# Scale ancestor tiles while the real tile loads
enabled = {approx_enabled}
max_depth = {max_depth}

[archive]
# Directory scanned for *.mbtiles files
directory = {archive_dir}
# Comma-separated tile trees laid out as {{name}}/{{z}}/{{x}}/{{y}}{{extension}}
tile_dirs = {archive_tile_dirs}

[assets]
# Read-only tiles laid out as {{name}}/{{z}}/{{x}}/{{y}}{{extension}}
directory = {assets_dir}
"#,
        name = config.source.name,
        urls = config.source.urls.join(", "),
        min_zoom = config.source.min_zoom,
        max_zoom = config.source.max_zoom,
        tile_size = config.source.tile_size,
        extension = config.source.extension,
        cache_dir = config.cache.directory.display(),
        max_size = format_size(config.cache.max_size),
        expiration = format_duration(config.cache.expiration),
        override_expiration = config
            .cache
            .override_expiration
            .map(format_duration)
            .unwrap_or_default(),
        purge_interval = format_duration(config.cache.purge_interval),
        stale_retention = format_duration(config.cache.stale_retention),
        timeout = format_duration(config.network.timeout),
        lag_ms = config.network.lag_ms,
        max_concurrent = config.network.max_concurrent,
        user_agent = config.network.user_agent,
        use_data_connection = config.network.use_data_connection,
        approx_enabled = config.approximation.enabled,
        max_depth = config.approximation.max_depth,
        archive_dir = path_or_empty(&config.archive.directory),
        archive_tile_dirs = config
            .archive
            .tile_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        assets_dir = path_or_empty(&config.assets.directory),
    )
}
