//! Per-list replica bookkeeping over a [`SetStore`].
//!
//! Key layout, for a list `L`:
//!
//! - `L:add_chunks`, `L:sub_chunks`: chunk numbers held
//! - `L:hosts`: host keys with at least one stored path prefix
//! - `L:host_<host>`: path prefixes stored for a host (`""` is a host-level entry)
//! - `L:chunk_<n>`: `<host>:<path>` pairs contributed by add-chunk `n`
//! - `L:owners_<host>_<path>`: add-chunks contributing that pair
//!
//! The attribution sets let a chunk deletion reverse exactly that chunk's entries
//! while leaving entries another live chunk also contributed.

use std::collections::{BTreeSet, HashMap};
use std::ops::Deref;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use compact_str::CompactString;

use crate::backend::SetStore;
use crate::entry::{ChunkKind, Entry, HostKey, PathPrefix};
use crate::error::StoreError;
use crate::ranges;

/// Store key holding the earliest time the next sync request may be sent.
pub const SYNC_DELAY_KEY: &str = "sync_delay";

/// Local replica of the watched lists.
///
/// Each watched list has its own read/write lock: mutations go through a
/// [`ListWriter`], lookups through a [`ListReader`]. The unguarded convenience
/// methods take the lock for a single call.
pub struct ListStore<S> {
    store: S,
    locks: HashMap<CompactString, RwLock<()>>,
}

impl<S: SetStore> ListStore<S> {
    /// Creates a replica over `store` for the given watch set.
    pub fn new<I, L>(store: S, lists: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<CompactString>,
    {
        let locks = lists.into_iter().map(|l| (l.into(), RwLock::new(()))).collect();
        Self { store, locks }
    }

    /// The underlying store, e.g. to snapshot it.
    pub fn backend(&self) -> &S {
        &self.store
    }

    pub fn is_watched(&self, list: &str) -> bool {
        self.locks.contains_key(list)
    }

    /// Shared access to one list's replica.
    pub fn read<'a>(&'a self, list: &'a str) -> Result<ListReader<'a, S>, StoreError> {
        let guard = self
            .lock_for(list)?
            .read()
            .map_err(|_| StoreError::Poisoned { list: list.into() })?;
        Ok(ListReader { view: ListView { store: &self.store, list }, _guard: guard })
    }

    /// Exclusive access to one list's replica.
    pub fn write<'a>(&'a self, list: &'a str) -> Result<ListWriter<'a, S>, StoreError> {
        let guard = self
            .lock_for(list)?
            .write()
            .map_err(|_| StoreError::Poisoned { list: list.into() })?;
        Ok(ListWriter { view: ListView { store: &self.store, list }, _guard: guard })
    }

    fn lock_for(&self, list: &str) -> Result<&RwLock<()>, StoreError> {
        self.locks.get(list).ok_or_else(|| StoreError::UnknownList { list: list.into() })
    }

    pub fn chunk_ranges(&self, list: &str, kind: ChunkKind) -> Result<String, StoreError> {
        self.read(list)?.chunk_ranges(kind)
    }

    pub fn chunk_numbers(&self, list: &str, kind: ChunkKind) -> Result<BTreeSet<u32>, StoreError> {
        self.read(list)?.chunk_numbers(kind)
    }

    pub fn record_chunk(&self, list: &str, kind: ChunkKind, chunk: u32) -> Result<(), StoreError> {
        self.write(list)?.record_chunk(kind, chunk)
    }

    pub fn delete_chunks(
        &self,
        list: &str,
        kind: ChunkKind,
        chunks: &[u32],
    ) -> Result<(), StoreError> {
        self.write(list)?.delete_chunks(kind, chunks)
    }

    pub fn apply_add_entries(
        &self,
        list: &str,
        chunk: u32,
        entries: &[Entry],
    ) -> Result<(), StoreError> {
        self.write(list)?.apply_add_entries(chunk, entries)
    }

    pub fn apply_sub_entries(
        &self,
        list: &str,
        chunk: u32,
        entries: &[Entry],
    ) -> Result<(), StoreError> {
        self.write(list)?.apply_sub_entries(chunk, entries)
    }

    pub fn host_known(&self, list: &str, host: HostKey) -> Result<bool, StoreError> {
        self.read(list)?.host_known(host)
    }

    pub fn path_prefixes_for_host(
        &self,
        list: &str,
        host: HostKey,
    ) -> Result<BTreeSet<PathPrefix>, StoreError> {
        self.read(list)?.path_prefixes_for_host(host)
    }

    /// Drops everything held for `list`.
    pub fn reset(&self, list: &str) -> Result<(), StoreError> {
        self.write(list)?.reset()
    }

    /// Earliest time the next sync may run, if that time is still in the future.
    pub fn sync_delay(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.store.get(SYNC_DELAY_KEY)? else {
            return Ok(None);
        };
        let until = raw
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .ok_or_else(|| StoreError::Corrupt { key: SYNC_DELAY_KEY.to_string(), value: raw })?;

        Ok((until > Utc::now()).then_some(until))
    }

    /// Forbids syncing for `seconds` from now. Returns the deadline.
    pub fn set_sync_delay(&self, seconds: u64) -> Result<DateTime<Utc>, StoreError> {
        // Whole seconds, matching what is persisted.
        let deadline = Utc::now().timestamp().saturating_add(i64::try_from(seconds).unwrap_or(i64::MAX));
        let until = DateTime::from_timestamp(deadline, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.store.set_with_expiry(
            SYNC_DELAY_KEY,
            &until.timestamp().to_string(),
            Duration::from_secs(seconds),
        )?;
        Ok(until)
    }
}

/// Read operations shared by readers and writers of one list.
pub struct ListView<'a, S> {
    store: &'a S,
    list: &'a str,
}

impl<S: SetStore> ListView<'_, S> {
    pub fn list(&self) -> &str {
        self.list
    }

    /// Chunk numbers held for `kind`, compressed to a range string.
    pub fn chunk_ranges(&self, kind: ChunkKind) -> Result<String, StoreError> {
        Ok(ranges::compress(self.chunk_numbers(kind)?))
    }

    pub fn chunk_numbers(&self, kind: ChunkKind) -> Result<BTreeSet<u32>, StoreError> {
        let key = self.chunks_key(kind);
        self.store
            .set_members(&key)?
            .into_iter()
            .map(|m| parse_chunk(&key, m))
            .collect()
    }

    pub fn host_known(&self, host: HostKey) -> Result<bool, StoreError> {
        self.store.set_contains(&self.hosts_key(), &host.to_hex())
    }

    pub fn path_prefixes_for_host(&self, host: HostKey) -> Result<BTreeSet<PathPrefix>, StoreError> {
        let key = self.host_key(&host.to_hex());
        self.store
            .set_members(&key)?
            .into_iter()
            .map(|m| {
                PathPrefix::from_hex(&m).ok_or_else(|| StoreError::Corrupt { key: key.clone(), value: m })
            })
            .collect()
    }

    fn chunks_key(&self, kind: ChunkKind) -> String {
        format!("{}:{}_chunks", self.list, kind.as_str())
    }

    fn hosts_key(&self) -> String {
        format!("{}:hosts", self.list)
    }

    fn host_key(&self, host: &str) -> String {
        format!("{}:host_{}", self.list, host)
    }

    fn chunk_key(&self, chunk: u32) -> String {
        format!("{}:chunk_{}", self.list, chunk)
    }

    fn owners_key(&self, host: &str, path: &str) -> String {
        format!("{}:owners_{}_{}", self.list, host, path)
    }
}

/// Shared guard over one list. Held by lookups.
pub struct ListReader<'a, S> {
    view: ListView<'a, S>,
    _guard: RwLockReadGuard<'a, ()>,
}

impl<'a, S> Deref for ListReader<'a, S> {
    type Target = ListView<'a, S>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

/// Exclusive guard over one list. Every mutation made through one writer is
/// invisible to readers until the writer is dropped.
pub struct ListWriter<'a, S> {
    view: ListView<'a, S>,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl<'a, S> Deref for ListWriter<'a, S> {
    type Target = ListView<'a, S>;

    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl<S: SetStore> ListWriter<'_, S> {
    /// Marks a chunk as held.
    pub fn record_chunk(&self, kind: ChunkKind, chunk: u32) -> Result<(), StoreError> {
        self.store.set_add(&self.chunks_key(kind), &chunk.to_string())?;
        Ok(())
    }

    /// Forgets chunks. Deleting add-chunks also withdraws every entry they contributed
    /// that no other live add-chunk still vouches for.
    pub fn delete_chunks(&self, kind: ChunkKind, chunks: &[u32]) -> Result<(), StoreError> {
        let chunks_key = self.chunks_key(kind);
        for &chunk in chunks {
            if kind == ChunkKind::Add {
                let chunk_key = self.chunk_key(chunk);
                let chunk_member = chunk.to_string();
                for pair in self.store.set_members(&chunk_key)? {
                    let (host, path) = split_pair(&chunk_key, &pair)?;
                    let owners_key = self.owners_key(host, path);
                    self.store.set_remove(&owners_key, &chunk_member)?;
                    if self.store.set_members(&owners_key)?.is_empty() {
                        self.remove_path(host, path)?;
                    }
                }
                self.store.delete(&chunk_key)?;
            }
            self.store.set_remove(&chunks_key, &chunk.to_string())?;
        }
        tracing::debug!(list = self.list, %kind, count = chunks.len(), "deleted chunks");
        Ok(())
    }

    /// Inserts each entry under its host, attributed to the entry's source chunk.
    pub fn apply_add_entries(&self, chunk: u32, entries: &[Entry]) -> Result<(), StoreError> {
        let hosts_key = self.hosts_key();
        for entry in entries {
            let host = entry.host_key.to_hex();
            let path = entry.path_prefix.to_hex();
            self.store.set_add(&hosts_key, &host)?;
            self.store.set_add(&self.host_key(&host), &path)?;
            self.store.set_add(&self.chunk_key(entry.source_chunk), &format!("{host}:{path}"))?;
            self.store.set_add(&self.owners_key(&host, &path), &entry.source_chunk.to_string())?;
        }
        tracing::trace!(list = self.list, chunk, entries = entries.len(), "applied add entries");
        Ok(())
    }

    /// Withdraws each entry's path prefix from its host, along with the attribution
    /// records of every add-chunk that contributed it.
    pub fn apply_sub_entries(&self, chunk: u32, entries: &[Entry]) -> Result<(), StoreError> {
        for entry in entries {
            let host = entry.host_key.to_hex();
            let path = entry.path_prefix.to_hex();
            let owners_key = self.owners_key(&host, &path);
            let pair = format!("{host}:{path}");
            for owner in self.store.set_members(&owners_key)? {
                let owner = parse_chunk(&owners_key, owner)?;
                self.store.set_remove(&self.chunk_key(owner), &pair)?;
            }
            self.store.delete(&owners_key)?;
            self.remove_path(&host, &path)?;
        }
        tracing::trace!(list = self.list, chunk, entries = entries.len(), "applied sub entries");
        Ok(())
    }

    /// Drops every key held for this list.
    pub fn reset(&self) -> Result<(), StoreError> {
        let hosts_key = self.hosts_key();
        for host in self.store.set_members(&hosts_key)? {
            let host_key = self.host_key(&host);
            for path in self.store.set_members(&host_key)? {
                self.store.delete(&self.owners_key(&host, &path))?;
            }
            self.store.delete(&host_key)?;
        }
        for chunk in self.chunk_numbers(ChunkKind::Add)? {
            self.store.delete(&self.chunk_key(chunk))?;
        }
        self.store.delete(&hosts_key)?;
        self.store.delete(&self.chunks_key(ChunkKind::Add))?;
        self.store.delete(&self.chunks_key(ChunkKind::Sub))?;
        tracing::info!(list = self.list, "reset list replica");
        Ok(())
    }

    fn remove_path(&self, host: &str, path: &str) -> Result<(), StoreError> {
        let host_key = self.host_key(host);
        self.store.set_remove(&host_key, path)?;
        if self.store.set_members(&host_key)?.is_empty() {
            self.store.set_remove(&self.hosts_key(), host)?;
        }
        Ok(())
    }
}

fn parse_chunk(key: &str, member: String) -> Result<u32, StoreError> {
    member.parse().map_err(|_| StoreError::Corrupt { key: key.to_string(), value: member })
}

fn split_pair<'p>(key: &str, pair: &'p str) -> Result<(&'p str, &'p str), StoreError> {
    pair.split_once(':')
        .ok_or_else(|| StoreError::Corrupt { key: key.to_string(), value: pair.to_string() })
}
