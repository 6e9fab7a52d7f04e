//! Local replica of Safe Browsing shavar lists.
//!
//! A watched list is held as the chunk numbers received for it plus, per host key,
//! the set of path hash prefixes its add-chunks contributed and its sub-chunks have
//! not withdrawn. [`ListStore`] maps that model onto any [`SetStore`], a minimal
//! Redis-shaped key/value-and-set interface; [`MemoryStore`] is an in-process
//! implementation that can be snapshotted to JSON.
//!
//! # Example
//!
//! ```
//! use shavar_store::{ChunkKind, Entry, HostKey, ListStore, MemoryStore, PathPrefix};
//!
//! let store = ListStore::new(MemoryStore::new(), ["goog-malware-shavar"]);
//! let host = HostKey([0xAA, 0xBB, 0xCC, 0xDD]);
//!
//! store.record_chunk("goog-malware-shavar", ChunkKind::Add, 12).unwrap();
//! store
//!     .apply_add_entries("goog-malware-shavar", 12, &[Entry::new(host, PathPrefix::new([1, 2, 3, 4]), 12)])
//!     .unwrap();
//!
//! assert!(store.host_known("goog-malware-shavar", host).unwrap());
//! assert_eq!(store.chunk_ranges("goog-malware-shavar", ChunkKind::Add).unwrap(), "12");
//! ```

pub mod backend;
pub mod entry;
pub mod error;
pub mod hex;
pub mod list;
pub mod ranges;

pub use backend::{MemoryStore, SetStore};
pub use entry::{ChunkKind, Entry, HostKey, PathPrefix};
pub use error::{RangeError, StoreError};
pub use list::{ListReader, ListStore, ListView, ListWriter, SYNC_DELAY_KEY};
