//! Tile expiration policy.
//!
//! Decides when a downloaded tile stops being fresh. The server's own
//! caching headers are honoured unless an override is configured:
//!
//! 1. `override_lifetime`, if set
//! 2. `Cache-Control: max-age`
//! 3. `Expires`
//! 4. `default_lifetime`

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default freshness of a downloaded tile: one week.
pub const DEFAULT_TILE_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Freshness hints taken from an HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Freshness {
    /// `Cache-Control: max-age` in seconds
    pub max_age: Option<u64>,
    /// Parsed `Expires` header
    pub expires: Option<DateTime<Utc>>,
}

impl Freshness {
    /// Builds freshness hints from raw header values.
    ///
    /// Unparseable values are ignored.
    pub fn from_headers(cache_control: Option<&str>, expires: Option<&str>) -> Self {
        Self {
            max_age: cache_control.and_then(parse_max_age),
            expires: expires.and_then(parse_http_date),
        }
    }
}

/// Computes expiration timestamps for new cache entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationPolicy {
    default_lifetime: Duration,
    override_lifetime: Option<Duration>,
}

impl ExpirationPolicy {
    pub fn new(default_lifetime: Duration) -> Self {
        Self {
            default_lifetime,
            override_lifetime: None,
        }
    }

    /// Ignores server headers and always uses `lifetime`.
    pub fn with_override(mut self, lifetime: Option<Duration>) -> Self {
        self.override_lifetime = lifetime;
        self
    }

    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }

    pub fn override_lifetime(&self) -> Option<Duration> {
        self.override_lifetime
    }

    /// Expiration for a tile fetched at `now`.
    pub fn expires_at(&self, now: DateTime<Utc>, freshness: &Freshness) -> DateTime<Utc> {
        if let Some(lifetime) = self.override_lifetime {
            return now + to_chrono(lifetime);
        }
        if let Some(max_age) = freshness.max_age {
            return now + to_chrono(Duration::from_secs(max_age));
        }
        if let Some(expires) = freshness.expires {
            return expires;
        }
        now + to_chrono(self.default_lifetime)
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_LIFETIME)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    // Out-of-range lifetimes saturate at a century
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Extracts `max-age` from a `Cache-Control` header value.
pub fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

/// Parses an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
