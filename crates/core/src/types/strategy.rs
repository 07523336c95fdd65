//! Caching strategies for sub-requests.
//!
//! A strategy is the structured form of a `Cache-Control` header. Strategies
//! are built from presets and rendered to (or parsed from) header values:
//!
//! | Preset | Header |
//! |--------|--------|
//! | [`CacheStrategy::none`] | `no-store` |
//! | [`CacheStrategy::short`] | `public, max-age=1, stale-while-revalidate=9` |
//! | [`CacheStrategy::long`] | `public, max-age=3600, stale-while-revalidate=82800` |
//! | [`CacheStrategy::custom`] | exactly the given fields |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const SHORT_MAX_AGE: u64 = 1;
const SHORT_STALE_WHILE_REVALIDATE: u64 = 9;
const LONG_MAX_AGE: u64 = 3600;
const LONG_STALE_WHILE_REVALIDATE: u64 = 82_800;

/// Cache mode directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Cacheable by shared caches.
    Public,
    /// Cacheable by the end user's cache only.
    Private,
    /// Never stored.
    NoStore,
    /// Must be revalidated once stale.
    MustRevalidate,
}

impl CacheMode {
    /// Directive as it appears in a `Cache-Control` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::NoStore => "no-store",
            Self::MustRevalidate => "must-revalidate",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "no-store" => Some(Self::NoStore),
            "must-revalidate" => Some(Self::MustRevalidate),
            _ => None,
        }
    }
}

/// Caching strategy for a sub-request.
///
/// All durations are in whole seconds. Unset fields are omitted from the
/// rendered header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStrategy {
    /// Cache mode directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CacheMode>,
    /// Seconds the value is fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    /// Seconds after `max_age` during which a stale value may be served
    /// while it is refreshed in the background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_while_revalidate: Option<u64>,
    /// Shared-cache override of `max_age`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_max_age: Option<u64>,
    /// Seconds a stale value may be served when the origin fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_if_error: Option<u64>,
}

impl CacheStrategy {
    /// Never cache.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            mode: Some(CacheMode::NoStore),
            max_age: None,
            stale_while_revalidate: None,
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Short-lived public cache: fresh for 1 second, stale for 9 more.
    #[must_use]
    pub const fn short() -> Self {
        Self {
            mode: Some(CacheMode::Public),
            max_age: Some(SHORT_MAX_AGE),
            stale_while_revalidate: Some(SHORT_STALE_WHILE_REVALIDATE),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Long-lived public cache: fresh for 1 hour, stale for 23 more.
    #[must_use]
    pub const fn long() -> Self {
        Self {
            mode: Some(CacheMode::Public),
            max_age: Some(LONG_MAX_AGE),
            stale_while_revalidate: Some(LONG_STALE_WHILE_REVALIDATE),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// A strategy made of exactly the given fields.
    #[must_use]
    pub const fn custom(overrides: Self) -> Self {
        overrides
    }

    /// [`Self::short`] with `overrides` applied on top.
    #[must_use]
    pub const fn short_with(overrides: Self) -> Self {
        Self::short().merge(overrides)
    }

    /// [`Self::long`] with `overrides` applied on top.
    #[must_use]
    pub const fn long_with(overrides: Self) -> Self {
        Self::long().merge(overrides)
    }

    /// Fields set in `overrides` replace the fields in `self`.
    #[must_use]
    pub const fn merge(self, overrides: Self) -> Self {
        Self {
            mode: match overrides.mode {
                Some(mode) => Some(mode),
                None => self.mode,
            },
            max_age: match overrides.max_age {
                Some(v) => Some(v),
                None => self.max_age,
            },
            stale_while_revalidate: match overrides.stale_while_revalidate {
                Some(v) => Some(v),
                None => self.stale_while_revalidate,
            },
            s_max_age: match overrides.s_max_age {
                Some(v) => Some(v),
                None => self.s_max_age,
            },
            stale_if_error: match overrides.stale_if_error {
                Some(v) => Some(v),
                None => self.stale_if_error,
            },
        }
    }

    /// Set `max-age`.
    #[must_use]
    pub const fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Set `stale-while-revalidate`.
    #[must_use]
    pub const fn with_stale_while_revalidate(mut self, seconds: u64) -> Self {
        self.stale_while_revalidate = Some(seconds);
        self
    }

    /// Whether values under this strategy must never reach a cache.
    #[must_use]
    pub const fn is_no_store(&self) -> bool {
        matches!(self.mode, Some(CacheMode::NoStore))
    }

    /// Fresh window in seconds (0 when unset).
    #[must_use]
    pub const fn max_age_secs(&self) -> u64 {
        match self.max_age {
            Some(v) => v,
            None => 0,
        }
    }

    /// Stale window in seconds (0 when unset).
    #[must_use]
    pub const fn stale_while_revalidate_secs(&self) -> u64 {
        match self.stale_while_revalidate {
            Some(v) => v,
            None => 0,
        }
    }

    /// How long a backing store must keep the entry: `max-age` plus the
    /// stale window, so stale values are still there to be served.
    #[must_use]
    pub const fn padded_lifetime(&self) -> Duration {
        Duration::from_secs(
            self.max_age_secs()
                .saturating_add(self.stale_while_revalidate_secs()),
        )
    }

    /// Render as a `Cache-Control` header value.
    #[must_use]
    pub fn to_header(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        if let Some(mode) = self.mode {
            parts.push(mode.as_str().to_string());
        }
        if let Some(v) = self.max_age {
            parts.push(format!("max-age={v}"));
        }
        if let Some(v) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={v}"));
        }
        if let Some(v) = self.s_max_age {
            parts.push(format!("s-maxage={v}"));
        }
        if let Some(v) = self.stale_if_error {
            parts.push(format!("stale-if-error={v}"));
        }
        parts.join(", ")
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header())
    }
}

/// Error parsing a `Cache-Control` header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid cache-control directive: {0}")]
pub struct CacheControlParseError(pub String);

impl FromStr for CacheStrategy {
    type Err = CacheControlParseError;

    /// Parse a `Cache-Control` header. Unknown directives are ignored;
    /// known directives with non-numeric values are rejected.
    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let mut strategy = Self::default();

        for part in header.split(',') {
            let part = part.trim().to_ascii_lowercase();
            if part.is_empty() {
                continue;
            }

            let Some((name, value)) = part.split_once('=') else {
                if let Some(mode) = CacheMode::parse(&part) {
                    strategy.mode = Some(mode);
                }
                continue;
            };

            let name = name.trim();
            let parse_secs = || {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| CacheControlParseError(part.clone()))
            };

            match name {
                "max-age" => strategy.max_age = Some(parse_secs()?),
                "stale-while-revalidate" => strategy.stale_while_revalidate = Some(parse_secs()?),
                "s-maxage" => strategy.s_max_age = Some(parse_secs()?),
                "stale-if-error" => strategy.stale_if_error = Some(parse_secs()?),
                _ => {}
            }
        }

        Ok(strategy)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_headers() {
        assert_eq!(CacheStrategy::none().to_header(), "no-store");
        assert_eq!(
            CacheStrategy::short().to_header(),
            "public, max-age=1, stale-while-revalidate=9"
        );
        assert_eq!(
            CacheStrategy::long().to_header(),
            "public, max-age=3600, stale-while-revalidate=82800"
        );
    }

    #[test]
    fn test_custom_is_exact() {
        let strategy = CacheStrategy::custom(CacheStrategy {
            mode: Some(CacheMode::Private),
            max_age: Some(30),
            ..Default::default()
        });
        assert_eq!(strategy.to_header(), "private, max-age=30");
    }

    #[test]
    fn test_short_with_overrides() {
        let strategy = CacheStrategy::short_with(CacheStrategy::default().with_max_age(5));
        assert_eq!(strategy.max_age, Some(5));
        assert_eq!(strategy.stale_while_revalidate, Some(9));
        assert_eq!(strategy.mode, Some(CacheMode::Public));
    }

    #[test]
    fn test_padded_lifetime() {
        assert_eq!(CacheStrategy::short().padded_lifetime(), Duration::from_secs(10));
        assert_eq!(CacheStrategy::none().padded_lifetime(), Duration::ZERO);
    }

    #[test]
    fn test_parse_header() {
        let strategy: CacheStrategy = "public, max-age=15, stale-while-revalidate=30, foo=bar"
            .parse()
            .unwrap();
        assert_eq!(strategy.mode, Some(CacheMode::Public));
        assert_eq!(strategy.max_age, Some(15));
        assert_eq!(strategy.stale_while_revalidate, Some(30));
        assert_eq!(strategy.s_max_age, None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let strategy: CacheStrategy = "No-Store".parse().unwrap();
        assert!(strategy.is_no_store());
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        let result = "max-age=soon".parse::<CacheStrategy>();
        assert!(result.is_err());
    }

    #[test]
    fn test_header_parse_inverse() {
        let strategy = CacheStrategy::long_with(CacheStrategy {
            s_max_age: Some(60),
            stale_if_error: Some(120),
            ..Default::default()
        });
        let parsed: CacheStrategy = strategy.to_header().parse().unwrap();
        assert_eq!(parsed, strategy);
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_value(CacheStrategy::short()).unwrap();
        assert_eq!(json["maxAge"], 1);
        assert_eq!(json["staleWhileRevalidate"], 9);
        assert_eq!(json["mode"], "public");
    }
}
