//! URL classification against a local Safe Browsing shavar replica.
//!
//! A URL is never sent to the remote service. It is canonicalized, expanded into
//! the host/path combinations the protocol requires checking, and each combination
//! is hashed with SHA-256. Leading 4-byte prefixes are matched against the replica
//! held in a [`shavar_store::ListStore`]; only on a prefix hit are the matching
//! prefixes sent upstream (through a [`FullHashResolver`]) to confirm against the
//! full 32-byte digests.
//!
//! Hosts the replica lists as a whole (host-level entries) match without any
//! remote call.

pub mod canonicalize;
pub mod expansion;
pub mod lookup;

pub use canonicalize::{Canonical, UrlParts, canonicalize};
pub use expansion::{
    Candidate, Expansion, FULL_HASH_LEN, candidate_hosts, candidate_paths, hash_prefix, host_key,
    is_ip_literal, sha256,
};
pub use lookup::{FullHash, FullHashResolver, LookupEngine, LookupError};
