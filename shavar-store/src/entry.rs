use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hex::{decode_hex, encode_hex};

/// Whether a chunk inserts entries into a list or countermands them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Add,
    Sub,
}

impl ChunkKind {
    /// Name used in store keys (`add_chunks`, `sub_chunks`).
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Add => "add",
            ChunkKind::Sub => "sub",
        }
    }

    /// Single-letter tag used on the wire (`a:` / `s:`).
    pub fn wire_tag(self) -> &'static str {
        match self {
            ChunkKind::Add => "a",
            ChunkKind::Sub => "s",
        }
    }

    pub fn from_wire_tag(tag: &str) -> Option<Self> {
        match tag {
            "a" => Some(ChunkKind::Add),
            "s" => Some(ChunkKind::Sub),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leading 4 bytes of the SHA-256 digest of a host followed by `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey(pub [u8; 4]);

impl HostKey {
    pub fn to_hex(self) -> String {
        encode_hex(&self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = decode_hex(s)?;
        Some(HostKey(bytes.try_into().ok()?))
    }
}

impl From<[u8; 4]> for HostKey {
    fn from(bytes: [u8; 4]) -> Self {
        HostKey(bytes)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash prefix of a full host+path candidate, `hash_len` bytes wide.
///
/// The empty prefix marks a host-level entry: every URL on the host is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathPrefix(Vec<u8>);

impl PathPrefix {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PathPrefix(bytes.into())
    }

    /// The prefix standing for the whole host.
    pub fn host_level() -> Self {
        PathPrefix(Vec::new())
    }

    pub fn is_host_level(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `digest` begins with this prefix. Host-level prefixes match nothing here;
    /// callers check [`PathPrefix::is_host_level`] first.
    pub fn matches(&self, digest: &[u8]) -> bool {
        !self.0.is_empty() && digest.starts_with(&self.0)
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        decode_hex(s).map(PathPrefix)
    }
}

impl From<&[u8]> for PathPrefix {
    fn from(bytes: &[u8]) -> Self {
        PathPrefix(bytes.to_vec())
    }
}

impl fmt::Display for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host_level() { f.write_str("<host>") } else { f.write_str(&self.to_hex()) }
    }
}

/// One record decoded from a chunk body.
///
/// `source_chunk` is the add-chunk the entry is attributed to. For sub entries this is
/// the add-chunk being countermanded, not the sub-chunk carrying the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub host_key: HostKey,
    pub path_prefix: PathPrefix,
    pub source_chunk: u32,
}

impl Entry {
    pub fn new(host_key: impl Into<HostKey>, path_prefix: PathPrefix, source_chunk: u32) -> Self {
        Self { host_key: host_key.into(), path_prefix, source_chunk }
    }
}
