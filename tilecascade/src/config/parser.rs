//! INI parsing.

use std::path::PathBuf;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::{parse_duration, parse_size};

/// Parses an INI document, overlaying its values on the defaults.
///
/// Unknown sections and keys are ignored. Empty values keep the default,
/// except where emptiness means "unset" (`override_expiration`, paths).
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("source")) {
        if let Some(v) = non_empty(section.get("name")) {
            config.source.name = v.to_string();
        }
        if let Some(v) = section.get("url") {
            config.source.urls = v
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = non_empty(section.get("min_zoom")) {
            config.source.min_zoom = parse_number("source", "min_zoom", v)?;
        }
        if let Some(v) = non_empty(section.get("max_zoom")) {
            config.source.max_zoom = parse_number("source", "max_zoom", v)?;
        }
        if let Some(v) = non_empty(section.get("tile_size")) {
            config.source.tile_size = parse_number("source", "tile_size", v)?;
        }
        if let Some(v) = section.get("extension") {
            config.source.extension = v.trim().to_string();
        }
    }

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = non_empty(section.get("directory")) {
            config.cache.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section.get("max_size")) {
            config.cache.max_size =
                parse_size(v).map_err(|e| invalid("cache", "max_size", v, e.to_string()))?;
        }
        if let Some(v) = non_empty(section.get("expiration")) {
            config.cache.expiration = duration("cache", "expiration", v)?;
        }
        if let Some(v) = section.get("override_expiration") {
            config.cache.override_expiration = match v.trim() {
                "" | "none" => None,
                v => Some(duration("cache", "override_expiration", v)?),
            };
        }
        if let Some(v) = non_empty(section.get("purge_interval")) {
            config.cache.purge_interval = duration("cache", "purge_interval", v)?;
        }
        if let Some(v) = non_empty(section.get("stale_retention")) {
            config.cache.stale_retention = duration("cache", "stale_retention", v)?;
        }
    }

    if let Some(section) = ini.section(Some("network")) {
        if let Some(v) = non_empty(section.get("timeout")) {
            let timeout = duration("network", "timeout", v)?;
            if timeout.is_zero() {
                return Err(invalid("network", "timeout", v, "must be greater than zero"));
            }
            config.network.timeout = timeout;
        }
        if let Some(v) = non_empty(section.get("lag_ms")) {
            config.network.lag_ms = parse_number("network", "lag_ms", v)?;
        }
        if let Some(v) = non_empty(section.get("max_concurrent")) {
            let max: usize = parse_number("network", "max_concurrent", v)?;
            if max == 0 {
                return Err(invalid("network", "max_concurrent", v, "must be at least 1"));
            }
            config.network.max_concurrent = max;
        }
        if let Some(v) = non_empty(section.get("user_agent")) {
            config.network.user_agent = v.to_string();
        }
        if let Some(v) = non_empty(section.get("use_data_connection")) {
            config.network.use_data_connection = parse_bool("network", "use_data_connection", v)?;
        }
    }

    if let Some(section) = ini.section(Some("approximation")) {
        if let Some(v) = non_empty(section.get("enabled")) {
            config.approximation.enabled = parse_bool("approximation", "enabled", v)?;
        }
        if let Some(v) = non_empty(section.get("max_depth")) {
            config.approximation.max_depth = parse_number("approximation", "max_depth", v)?;
        }
    }

    if let Some(section) = ini.section(Some("archive")) {
        config.archive.directory = non_empty(section.get("directory")).map(expand_tilde);
        if let Some(v) = section.get("tile_dirs") {
            config.archive.tile_dirs = v
                .split(',')
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(expand_tilde)
                .collect();
        }
    }

    if let Some(section) = ini.section(Some("assets")) {
        config.assets.directory = non_empty(section.get("directory")).map(expand_tilde);
    }

    Ok(config)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<T, ConfigFileError> {
    value
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer in range"))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

fn duration(
    section: &str,
    key: &str,
    value: &str,
) -> Result<std::time::Duration, ConfigFileError> {
    parse_duration(value).map_err(|e| invalid(section, key, value, e.to_string()))
}

/// Expands a leading `~` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
