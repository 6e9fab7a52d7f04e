//! Keeps a local replica of Google Safe Browsing v2.2 ("shavar") lists in sync and
//! classifies URLs against it.
//!
//! **This is a client for the chunk-based v2.2 protocol only.** It speaks the
//! `list`, `downloads` and `gethash` endpoints and follows redirect URLs to fetch
//! binary chunk data. The replica lives in a [`shavar_store::ListStore`]; lookups
//! go through [`shavar_verifier::LookupEngine`] with an [`ApiClient`] confirming
//! prefix hits.
//!
//! # Sync
//!
//! Each [`SyncEngine::update`] call:
//!
//! 1. Returns [`SyncOutcome::Delayed`] without contacting the service if a previous
//!    response asked for a back-off that hasn't elapsed.
//! 2. Intersects the configured lists with the ones the service offers.
//! 3. Posts a `downloads` request reporting the chunk ranges already held:
//!
//!    ```text
//!    goog-malware-shavar;a:1-3,5:s:2
//!    googpub-phish-shavar;
//!    ```
//!
//! 4. Applies `n:` (next-sync delay) and `ad:`/`sd:` (chunk deletion) lines as they
//!    are read, and queues every `u:` redirect.
//! 5. Fetches redirect bodies concurrently and applies each one atomically, in the
//!    order the service gave them. A redirect that fails to fetch or decode is
//!    reported and skipped without stopping the others.
//!
//! # Chunk format
//!
//! Redirect bodies are a series of `<a|s>:<chunk>:<hash_len>:<len>\n` headers, each
//! followed by `len` bytes of binary chunk data. See [`conversion`] for the layout.
//!
//! # Usage
//!
//! ```sh
//! shavar --api-key $KEY update
//! shavar lookup http://example.com/some/page
//! ```

pub mod api;
pub mod config;
pub mod conversion;
pub mod error;
pub mod protocol;
pub mod sync;
pub mod transport;

pub use api::ApiClient;
pub use config::Config;
pub use conversion::{RedirectBody, RedirectChunk, decode_chunk, parse_redirect_body};
pub use error::{ChunkError, Error};
pub use protocol::{Directive, parse_downloads_response, request_line};
pub use sync::{RedirectFailure, SyncEngine, SyncOutcome, SyncReport};
pub use transport::{HttpTransport, Transport};
