//! Cache keys.
//!
//! A cache key is an ordered list of values (`["my-cms", query_text]`). The
//! list is serialized as a JSON array and hashed with SHA-256, so:
//! - equal lists always hash to the same key
//! - `["a:b"]` and `["a", "b"]` hash to different keys

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Display prefix for keys that have no request URL of their own.
const KEY_URL_PREFIX: &str = "https://cache.headwater.local/?";

/// Ordered cache dimensions identifying one cached value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<Value>);

impl CacheKey {
    /// Build a key from any list of JSON-convertible parts.
    pub fn new<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Append one more dimension.
    #[must_use]
    pub fn push(mut self, part: impl Into<Value>) -> Self {
        self.0.push(part.into());
        self
    }

    /// The raw parts.
    #[must_use]
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// Stable hashed form used to address the backing store.
    #[must_use]
    pub fn hash(&self) -> HashedKey {
        // Serializing a Vec<Value> cannot fail; objects serialize with sorted keys.
        let serialized = serde_json::to_string(&self.0).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        HashedKey(format!("{digest:x}"))
    }
}

impl fmt::Display for CacheKey {
    /// Human-readable form: string parts verbatim, other parts as JSON, joined by `:`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(":");
        f.write_str(&rendered)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(vec![Value::String(key.to_string())])
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(vec![Value::String(key)])
    }
}

impl<T: Into<Value>> From<Vec<T>> for CacheKey {
    fn from(parts: Vec<T>) -> Self {
        Self::new(parts)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for CacheKey {
    fn from(parts: [T; N]) -> Self {
        Self::new(parts)
    }
}

/// Hex-encoded SHA-256 of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashedKey(String);

impl HashedKey {
    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display URL for profiler events that have no request URL.
    #[must_use]
    pub fn key_url(&self) -> String {
        format!("{KEY_URL_PREFIX}{}", self.0)
    }
}

impl fmt::Display for HashedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HashedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
