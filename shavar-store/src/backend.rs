use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Key/value-and-set store backing a [`ListStore`](crate::ListStore).
///
/// Shaped after a Redis-style server: string keys hold either an unordered set of
/// string members or a single string value with an optional expiry. Implementations
/// must be safe to share between a syncing task and concurrent lookups.
pub trait SetStore: Send + Sync {
    /// Adds `member` to the set at `key`. Returns `true` if it was not already present.
    fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Removes `member` from the set at `key`. Returns `true` if it was present.
    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// All members of the set at `key`; empty if the key is absent.
    fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Removes `key` whatever it holds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Reads a string value. Expired values read as absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    sets: HashMap<String, BTreeSet<String>>,
    strings: HashMap<String, StringValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StringValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StringValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process [`SetStore`] that can be saved to and restored from a JSON snapshot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        tracing::debug!(path = %path.display(), sets = snapshot.sets.len(), "loaded store snapshot");
        Ok(Self { inner: Mutex::new(snapshot) })
    }

    /// Writes the store to `path`, replacing it atomically via a sibling temp file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = {
            let mut inner = self.lock()?;
            let now = Utc::now();
            inner.strings.retain(|_, v| v.is_live(now));
            serde_json::to_vec(&*inner)?
        };

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved store snapshot");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }
}

impl SetStore for MemoryStore {
    fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        Ok(inner.sets.entry(key.to_string()).or_default().insert(member.to_string()))
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            inner.sets.remove(key);
        }
        Ok(removed)
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let inner = self.lock()?;
        Ok(inner.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock()?;
        Ok(inner.sets.get(key).map(|set| set.iter().cloned().collect()).unwrap_or_default())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.sets.remove(key);
        inner.strings.remove(key);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock()?;
        let now = Utc::now();
        Ok(inner.strings.get(key).filter(|v| v.is_live(now)).map(|v| v.value.clone()))
    }

    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        let mut inner = self.lock()?;
        inner
            .strings
            .insert(key.to_string(), StringValue { value: value.to_string(), expires_at });
        Ok(())
    }
}
