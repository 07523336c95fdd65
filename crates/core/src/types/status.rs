//! Cache status of a sub-request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::CacheStrategy;

/// Outcome of a cache lookup, or a write for profiler events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// Entry is within `max-age`.
    Hit,
    /// Entry is past `max-age` but inside the stale-while-revalidate window.
    Stale,
    /// No usable entry.
    Miss,
    /// A value was written to the cache.
    Put,
}

impl CacheStatus {
    /// Uppercase label used in logs and profiler events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Stale => "STALE",
            Self::Miss => "MISS",
            Self::Put => "PUT",
        }
    }

    /// Whether a cached value can be returned for this status.
    #[must_use]
    pub const fn is_servable(self) -> bool {
        matches!(self, Self::Hit | Self::Stale)
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an entry stored at `stored_at` under `strategy` as of `now`.
///
/// - `no-store`, or `max-age=0` (whatever the stale window): always [`CacheStatus::Miss`]
/// - `age <= max-age`: [`CacheStatus::Hit`]
/// - `max-age < age <= max-age + stale-while-revalidate`: [`CacheStatus::Stale`]
/// - older: [`CacheStatus::Miss`]
///
/// An entry from the future (clock skew) counts as age zero.
#[must_use]
pub fn classify(stored_at: DateTime<Utc>, strategy: &CacheStrategy, now: DateTime<Utc>) -> CacheStatus {
    let max_age = strategy.max_age_secs();
    let swr = strategy.stale_while_revalidate_secs();

    if strategy.is_no_store() || max_age == 0 {
        return CacheStatus::Miss;
    }

    let age_ms = u64::try_from((now - stored_at).num_milliseconds()).unwrap_or(0);
    let fresh_ms = max_age.saturating_mul(1000);
    let stale_ms = max_age.saturating_add(swr).saturating_mul(1000);

    if age_ms <= fresh_ms {
        CacheStatus::Hit
    } else if age_ms <= stale_ms {
        CacheStatus::Stale
    } else {
        CacheStatus::Miss
    }
}
