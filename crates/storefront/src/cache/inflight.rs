//! In-flight request registry.
//!
//! Maps a hashed key to the shared computation currently producing its value.
//! Callers that miss while a computation is running await the same future and
//! observe the same result. A computation removes its own entry when it
//! settles, so the map only ever holds unfinished work.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use headwater_core::HashedKey;
use serde_json::Value;

use super::CacheError;

/// A computation every joined caller can await.
pub type Computation = Shared<BoxFuture<'static, Result<Value, CacheError>>>;

#[derive(Default)]
pub struct InFlightRegistry {
    pending: Mutex<HashMap<HashedKey, Computation>>,
}

impl InFlightRegistry {
    /// Join the computation for `key`, or register the one built by `start`.
    ///
    /// Returns the computation and whether this caller started it. Lookup and
    /// insert happen under one lock, so at most one computation per key is
    /// ever registered.
    pub fn join_or_start<F>(&self, key: &HashedKey, start: F) -> (Computation, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<Value, CacheError>>,
    {
        let mut pending = self.lock();
        if let Some(existing) = pending.get(key) {
            return (existing.clone(), false);
        }

        let computation = start().shared();
        pending.insert(key.clone(), computation.clone());
        (computation, true)
    }

    /// Forget the computation for `key`.
    pub fn remove(&self, key: &HashedKey) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<HashedKey, Computation>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
