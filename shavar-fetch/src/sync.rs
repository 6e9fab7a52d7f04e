use std::path::Path;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use futures_util::{StreamExt, stream};
use shavar_store::{ChunkKind, ListStore, MemoryStore, SetStore, StoreError};

use crate::api::ApiClient;
use crate::config::Config;
use crate::conversion::{RedirectBody, parse_redirect_body};
use crate::error::Error;
use crate::protocol::{Directive, parse_downloads_response, request_line};
use crate::transport::Transport;

/// Result of one [`SyncEngine::update`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The service asked us to stay away until this time. Nothing was sent.
    Delayed { until: DateTime<Utc> },
    Completed(SyncReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Watched lists the service offered and we asked for.
    pub lists: Vec<CompactString>,
    /// Minimum wait before the next sync, if the service sent one.
    pub next_sync_secs: Option<u64>,
    pub add_chunks: usize,
    pub sub_chunks: usize,
    pub deleted_add_chunks: usize,
    pub deleted_sub_chunks: usize,
    pub redirects_applied: usize,
    pub redirect_failures: Vec<RedirectFailure>,
    /// Response lines and redirect records that were skipped as unknown or unparseable.
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectFailure {
    pub list: CompactString,
    pub url: String,
    pub error: String,
}

/// A redirect queued by the `downloads` response, tagged with the list it feeds.
struct PendingRedirect {
    list: CompactString,
    url: String,
}

/// Brings the local replica up to date with the service.
///
/// One update is: honor any stored back-off, intersect the watched lists with what
/// the service offers, report held chunks, apply deletions from the response, then
/// fetch redirect bodies (several at once) and apply each one atomically in the
/// order the service listed them.
pub struct SyncEngine<'a, T, S> {
    api: &'a ApiClient<T>,
    store: &'a ListStore<S>,
    config: &'a Config,
}

impl<'a, T, S> SyncEngine<'a, T, S>
where
    T: Transport,
    S: SetStore,
{
    pub fn new(api: &'a ApiClient<T>, store: &'a ListStore<S>, config: &'a Config) -> Self {
        Self { api, store, config }
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self) -> Result<SyncOutcome, Error> {
        if let Some(until) = self.store.sync_delay()? {
            tracing::warn!(%until, "sync deferred by server back-off");
            return Ok(SyncOutcome::Delayed { until });
        }

        let offered = self.api.list().await?;
        let lists: Vec<CompactString> =
            self.config.lists.iter().filter(|l| offered.contains(l)).cloned().collect();
        for missing in self.config.lists.iter().filter(|l| !offered.contains(l)) {
            tracing::warn!(list = %missing, "watched list not offered by server");
        }

        let mut report = SyncReport { lists: lists.clone(), ..Default::default() };
        if lists.is_empty() {
            tracing::warn!("no watched list is available, nothing to sync");
            return Ok(SyncOutcome::Completed(report));
        }

        let request = self.downloads_request(&lists)?;
        tracing::debug!(%request, "downloads request");
        let response = self.api.downloads(request).await?;

        let redirects = self.apply_directives(&response, &lists, &mut report)?;
        self.follow_redirects(redirects, &mut report).await?;

        tracing::info!(
            lists = report.lists.len(),
            add_chunks = report.add_chunks,
            sub_chunks = report.sub_chunks,
            redirects = report.redirects_applied,
            failures = report.redirect_failures.len(),
            "sync complete"
        );
        Ok(SyncOutcome::Completed(report))
    }

    /// One line per list, reporting the chunks already held.
    pub fn downloads_request(&self, lists: &[CompactString]) -> Result<String, StoreError> {
        let mut request = String::new();
        for list in lists {
            let reader = self.store.read(list)?;
            request.push_str(&request_line(
                list,
                &reader.chunk_ranges(ChunkKind::Add)?,
                &reader.chunk_ranges(ChunkKind::Sub)?,
            ));
        }
        Ok(request)
    }

    /// Applies delay and deletion directives immediately; returns redirects to follow.
    fn apply_directives(
        &self,
        response: &[u8],
        lists: &[CompactString],
        report: &mut SyncReport,
    ) -> Result<Vec<PendingRedirect>, Error> {
        let text = String::from_utf8_lossy(response);
        let mut current: Option<&CompactString> = None;
        let mut redirects = Vec::new();

        for directive in parse_downloads_response(&text) {
            match directive {
                Directive::Delay(secs) => {
                    let until = self.store.set_sync_delay(secs)?;
                    report.next_sync_secs = Some(secs);
                    tracing::info!(secs, %until, "next sync delayed");
                }
                Directive::List(name) => {
                    current = lists.iter().find(|l| **l == name);
                    if current.is_none() {
                        tracing::warn!(list = %name, "ignoring data for list we did not ask for");
                    }
                }
                Directive::Redirect(url) => match current {
                    Some(list) => redirects.push(PendingRedirect { list: list.clone(), url }),
                    None => {
                        tracing::warn!(%url, "redirect outside a requested list");
                        report.skipped_records += 1;
                    }
                },
                Directive::Delete { kind, chunks } => match current {
                    Some(list) => {
                        self.store.delete_chunks(list, kind, &chunks)?;
                        match kind {
                            ChunkKind::Add => report.deleted_add_chunks += chunks.len(),
                            ChunkKind::Sub => report.deleted_sub_chunks += chunks.len(),
                        }
                    }
                    None => {
                        tracing::warn!(%kind, ?chunks, "chunk deletion outside a requested list");
                        report.skipped_records += 1;
                    }
                },
                Directive::Unknown(line) => {
                    tracing::warn!(%line, "unknown response line");
                    report.skipped_records += 1;
                }
                Directive::Malformed { line, reason } => {
                    tracing::warn!(%line, %reason, "malformed response line");
                    report.skipped_records += 1;
                }
            }
        }

        Ok(redirects)
    }

    /// Fetches up to `redirect_concurrency` bodies at once but commits them strictly
    /// in order. A redirect that fails to fetch or decode is reported and skipped;
    /// a store failure aborts the sync.
    async fn follow_redirects(
        &self,
        redirects: Vec<PendingRedirect>,
        report: &mut SyncReport,
    ) -> Result<(), Error> {
        let total = redirects.len();
        let mut fetched = stream::iter(redirects)
            .map(|pending| async move {
                let body = self.api.redirect(&pending.url).await;
                (pending, body)
            })
            .buffered(self.config.redirect_concurrency.max(1));

        let mut index = 0;
        while let Some((pending, body)) = fetched.next().await {
            index += 1;
            let decoded = body.and_then(|bytes| parse_redirect_body(&bytes).map_err(Error::from));
            match decoded {
                Ok(parsed) => {
                    self.commit_redirect(&pending.list, &parsed, report)?;
                    report.redirects_applied += 1;
                    tracing::debug!(list = %pending.list, url = %pending.url, index, total, "applied redirect");
                }
                Err(e) => {
                    tracing::warn!(list = %pending.list, url = %pending.url, error = %e, "skipping redirect");
                    report.redirect_failures.push(RedirectFailure {
                        list: pending.list,
                        url: pending.url,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn commit_redirect(
        &self,
        list: &str,
        body: &RedirectBody,
        report: &mut SyncReport,
    ) -> Result<(), StoreError> {
        let writer = self.store.write(list)?;
        for chunk in &body.chunks {
            writer.record_chunk(chunk.kind, chunk.number)?;
            match chunk.kind {
                ChunkKind::Add => {
                    writer.apply_add_entries(chunk.number, &chunk.entries)?;
                    report.add_chunks += 1;
                }
                ChunkKind::Sub => {
                    writer.apply_sub_entries(chunk.number, &chunk.entries)?;
                    report.sub_chunks += 1;
                }
            }
        }
        for header in &body.unknown {
            tracing::warn!(list, %header, "skipped unknown chunk record");
        }
        report.skipped_records += body.unknown.len();
        Ok(())
    }
}

impl<T: Transport> SyncEngine<'_, T, MemoryStore> {
    /// Runs [`update`](Self::update), then writes the replica snapshot to `path`
    /// whether or not the update succeeded. Nothing is rolled back on failure, so
    /// deletions and redirects committed before the error are persisted too.
    pub async fn update_and_save(&self, path: &Path) -> Result<SyncOutcome, Error> {
        let outcome = self.update().await;
        if let Err(e) = self.store.backend().save(path) {
            tracing::error!(path = %path.display(), error = %e, "failed to save replica snapshot");
            if outcome.is_ok() {
                return Err(e.into());
            }
        }
        outcome
    }
}
