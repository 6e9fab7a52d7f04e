//! Expansion of a canonical URL into the host/path strings a client must check.

use std::net::{Ipv4Addr, Ipv6Addr};

use sha2::{Digest, Sha256};
use shavar_store::HostKey;

use crate::canonicalize::{Canonical, UrlParts, canonicalize};

/// Length of a full SHA-256 digest.
pub const FULL_HASH_LEN: usize = 32;

/// Most trailing host components considered for suffix candidates.
const MAX_HOST_COMPONENTS: usize = 5;

/// Most root-anchored path prefixes considered.
const MAX_PATH_PREFIXES: usize = 5;

/// A host+path string to check, with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub digest: [u8; FULL_HASH_LEN],
}

/// Everything lookup needs to know about one URL.
#[derive(Debug, Clone)]
pub struct Expansion {
    pub canonical: Canonical,
    pub hosts: Vec<String>,
    /// Host keys of `hosts`, same order.
    pub host_keys: Vec<HostKey>,
    pub candidates: Vec<Candidate>,
}

impl Expansion {
    pub fn new(url: &str) -> Self {
        let canonical = canonicalize(url);
        let hosts = candidate_hosts(&canonical.parts.host);
        let paths = candidate_paths(&canonical.parts);

        let candidates = hosts
            .iter()
            .flat_map(|host| paths.iter().map(move |path| format!("{host}{path}")))
            .map(|url| Candidate { digest: sha256(url.as_bytes()), url })
            .collect();
        let host_keys = hosts.iter().map(|h| host_key(h)).collect();

        Self { canonical, hosts, host_keys, candidates }
    }

    /// True if some candidate's full digest begins with `prefix`.
    pub fn matches_prefix(&self, prefix: &[u8]) -> bool {
        !prefix.is_empty() && self.candidates.iter().any(|c| c.digest.starts_with(prefix))
    }

    pub fn contains_digest(&self, digest: &[u8; FULL_HASH_LEN]) -> bool {
        self.candidates.iter().any(|c| &c.digest == digest)
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; FULL_HASH_LEN] {
    Sha256::digest(bytes).into()
}

/// Leading four bytes of the digest of `data`.
pub fn hash_prefix(data: &str) -> [u8; 4] {
    let digest = sha256(data.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Key of a host as the server stores it: the prefix of `host/`.
pub fn host_key(host: &str) -> HostKey {
    HostKey(hash_prefix(&format!("{host}/")))
}

pub fn is_ip_literal(host: &str) -> bool {
    let unbracketed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    host.parse::<Ipv4Addr>().is_ok() || unbracketed.parse::<Ipv6Addr>().is_ok()
}

/// The exact host, then up to four suffixes formed from its trailing 5..2 components.
/// IP literals yield only themselves.
pub fn candidate_hosts(host: &str) -> Vec<String> {
    let mut hosts = vec![host.to_string()];
    if is_ip_literal(host) {
        return hosts;
    }

    let components: Vec<&str> = host.split('.').collect();
    let n = components.len();
    let suffixes = n.saturating_sub(2).min(MAX_HOST_COMPONENTS - 1);
    for len in (2..2 + suffixes).rev() {
        hosts.push(components[n - len..].join("."));
    }
    hosts
}

/// Path with query, bare path, then the root-anchored directory prefixes of the path.
pub fn candidate_paths(parts: &UrlParts) -> Vec<String> {
    let mut paths = Vec::new();
    if !parts.query.is_empty() {
        paths.push(format!("{}{}", parts.path, parts.query));
    }
    paths.push(parts.path.clone());

    let mut segments: Vec<&str> = parts.path.split('/').collect();
    while segments.last() == Some(&"") {
        segments.pop();
    }

    let prefixes = segments.len().saturating_sub(1).min(MAX_PATH_PREFIXES);
    for i in 0..prefixes {
        let prefix = format!("{}/", segments[..=i].join("/"));
        if !paths.contains(&prefix) {
            paths.push(prefix);
        }
    }
    paths
}
