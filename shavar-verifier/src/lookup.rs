use std::future::Future;

use compact_str::CompactString;
use shavar_store::{ListStore, PathPrefix, SetStore, StoreError};

use crate::expansion::{Expansion, FULL_HASH_LEN};

/// A full-length hash returned by the remote service for a requested prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullHash {
    pub list: CompactString,
    pub add_chunk: u32,
    pub hash: [u8; FULL_HASH_LEN],
}

/// Resolves hash prefixes to the full hashes the remote service holds for them.
pub trait FullHashResolver {
    type Error: std::error::Error + Send + Sync + 'static;

    fn full_hashes(
        &self,
        prefixes: &[PathPrefix],
    ) -> impl Future<Output = Result<Vec<FullHash>, Self::Error>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("replica read failed: {0}")]
    Store(#[from] StoreError),

    #[error("full hash request failed: {0}")]
    FullHash(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// What one list's replica says about an expanded URL.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplicaHit {
    None,
    /// The whole host is listed; no confirmation needed.
    HostLevel,
    /// These stored prefixes match candidates and need full-hash confirmation.
    Prefixes(Vec<PathPrefix>),
}

/// Classifies URLs against the local replica of the watched lists.
///
/// Lists are checked in the order given at construction, and the first list that
/// matches wins; that order is the caller's priority order.
pub struct LookupEngine<'a, S, R> {
    store: &'a ListStore<S>,
    resolver: &'a R,
    lists: &'a [CompactString],
}

impl<'a, S, R> LookupEngine<'a, S, R>
where
    S: SetStore,
    R: FullHashResolver + Sync,
{
    pub fn new(store: &'a ListStore<S>, resolver: &'a R, lists: &'a [CompactString]) -> Self {
        Self { store, resolver, lists }
    }

    /// Returns the first watched list `url` matches, or `None`.
    #[tracing::instrument(skip(self), fields(canonical = tracing::field::Empty))]
    pub async fn lookup(&self, url: &str) -> Result<Option<CompactString>, LookupError> {
        let expansion = Expansion::new(url);
        tracing::Span::current().record("canonical", expansion.canonical.url.as_str());

        for list in self.lists {
            match self.replica_hit(list, &expansion)? {
                ReplicaHit::None => {}
                ReplicaHit::HostLevel => {
                    tracing::info!(%list, url = %expansion.canonical.url, "host-level match");
                    return Ok(Some(list.clone()));
                }
                ReplicaHit::Prefixes(prefixes) => {
                    let full_hashes = self
                        .resolver
                        .full_hashes(&prefixes)
                        .await
                        .map_err(|e| LookupError::FullHash(Box::new(e)))?;
                    let confirmed = full_hashes
                        .iter()
                        .filter(|f| f.list == *list)
                        .any(|f| expansion.contains_digest(&f.hash));
                    if confirmed {
                        tracing::info!(%list, url = %expansion.canonical.url, "full hash match");
                        return Ok(Some(list.clone()));
                    }
                    tracing::debug!(%list, prefixes = prefixes.len(), "prefix hit not confirmed");
                }
            }
        }

        tracing::debug!(url = %expansion.canonical.url, "no list matches");
        Ok(None)
    }

    /// Reads one list under its shared lock. Never held across an await.
    fn replica_hit(&self, list: &str, expansion: &Expansion) -> Result<ReplicaHit, StoreError> {
        let reader = self.store.read(list)?;
        let mut hits = Vec::new();

        for &host in &expansion.host_keys {
            if !reader.host_known(host)? {
                continue;
            }
            let stored = reader.path_prefixes_for_host(host)?;
            if stored.is_empty() || stored.iter().any(PathPrefix::is_host_level) {
                return Ok(ReplicaHit::HostLevel);
            }
            for prefix in stored {
                if expansion.matches_prefix(prefix.as_bytes()) && !hits.contains(&prefix) {
                    hits.push(prefix);
                }
            }
        }

        Ok(if hits.is_empty() { ReplicaHit::None } else { ReplicaHit::Prefixes(hits) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use shavar_store::{ChunkKind, Entry, MemoryStore};

    use super::*;
    use crate::expansion::{hash_prefix, host_key, sha256};

    const MALWARE: &str = "goog-malware-shavar";
    const PHISH: &str = "googpub-phish-shavar";

    #[derive(Debug, thiserror::Error)]
    #[error("resolver offline")]
    struct Offline;

    #[derive(Default)]
    struct StubResolver {
        hashes: Vec<FullHash>,
        calls: Mutex<Vec<Vec<PathPrefix>>>,
        fail: bool,
    }

    impl StubResolver {
        fn with_hash(list: &str, url: &str) -> Self {
            Self {
                hashes: vec![FullHash { list: list.into(), add_chunk: 1, hash: sha256(url.as_bytes()) }],
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl FullHashResolver for StubResolver {
        type Error = Offline;

        async fn full_hashes(&self, prefixes: &[PathPrefix]) -> Result<Vec<FullHash>, Offline> {
            self.calls.lock().unwrap().push(prefixes.to_vec());
            if self.fail { Err(Offline) } else { Ok(self.hashes.clone()) }
        }
    }

    fn lists() -> Vec<CompactString> {
        vec![MALWARE.into(), PHISH.into()]
    }

    fn replica() -> ListStore<MemoryStore> {
        ListStore::new(MemoryStore::new(), [MALWARE, PHISH])
    }

    fn add(store: &ListStore<MemoryStore>, list: &str, host: &str, candidate: Option<&str>) {
        let prefix = candidate.map(|c| PathPrefix::new(hash_prefix(c))).unwrap_or_default();
        store.record_chunk(list, ChunkKind::Add, 1).unwrap();
        store.apply_add_entries(list, 1, &[Entry::new(host_key(host), prefix, 1)]).unwrap();
    }

    #[tokio::test]
    async fn test_no_entries_no_match() {
        let store = replica();
        let resolver = StubResolver::default();
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        assert_eq!(engine.lookup("http://example.com/a/b?c=d").await.unwrap(), None);
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_host_level_block_needs_no_remote_call() {
        let store = replica();
        add(&store, PHISH, "example.com", None);
        let resolver = StubResolver::default();
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        let hit = engine.lookup("http://www.example.com/login").await.unwrap();
        assert_eq!(hit.as_deref(), Some(PHISH));
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_prefix_hit_confirmed_by_full_hash() {
        let store = replica();
        add(&store, MALWARE, "evil.example.com", Some("evil.example.com/bad/"));
        let resolver = StubResolver::with_hash(MALWARE, "evil.example.com/bad/");
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        let hit = engine.lookup("http://evil.example.com/bad/page.html").await.unwrap();
        assert_eq!(hit.as_deref(), Some(MALWARE));
        assert_eq!(resolver.calls(), 1);
        assert_eq!(
            resolver.calls.lock().unwrap()[0],
            vec![PathPrefix::new(hash_prefix("evil.example.com/bad/"))]
        );
    }

    #[tokio::test]
    async fn test_prefix_collision_without_full_hash_is_clean() {
        let store = replica();
        add(&store, MALWARE, "evil.example.com", Some("evil.example.com/bad/"));
        let resolver = StubResolver::with_hash(MALWARE, "evil.example.com/other/");
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        assert_eq!(engine.lookup("http://evil.example.com/bad/x").await.unwrap(), None);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_full_hash_from_another_list_does_not_confirm() {
        let store = replica();
        add(&store, MALWARE, "x.com", Some("x.com/"));
        let resolver = StubResolver::with_hash(PHISH, "x.com/");
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        assert_eq!(engine.lookup("http://x.com/").await.unwrap(), None);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn test_stored_prefix_for_other_path_is_not_sent() {
        let store = replica();
        add(&store, MALWARE, "example.com", Some("example.com/elsewhere/"));
        let resolver = StubResolver::default();
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        assert_eq!(engine.lookup("http://example.com/a/b").await.unwrap(), None);
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_list_in_priority_order_wins() {
        let store = replica();
        add(&store, MALWARE, "example.com", None);
        add(&store, PHISH, "example.com", None);
        let resolver = StubResolver::default();

        let malware_first = lists();
        let engine = LookupEngine::new(&store, &resolver, &malware_first);
        assert_eq!(engine.lookup("example.com").await.unwrap().as_deref(), Some(MALWARE));

        let phish_first: Vec<CompactString> = vec![PHISH.into(), MALWARE.into()];
        let engine = LookupEngine::new(&store, &resolver, &phish_first);
        assert_eq!(engine.lookup("example.com").await.unwrap().as_deref(), Some(PHISH));
    }

    #[tokio::test]
    async fn test_resolver_failure_surfaces() {
        let store = replica();
        add(&store, MALWARE, "example.com", Some("example.com/"));
        let resolver = StubResolver { fail: true, ..Default::default() };
        let lists = lists();
        let engine = LookupEngine::new(&store, &resolver, &lists);

        let err = engine.lookup("http://example.com/").await.unwrap_err();
        assert!(matches!(err, LookupError::FullHash(_)));
    }
}
