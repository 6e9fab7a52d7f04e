use shavar_store::StoreError;
use shavar_verifier::LookupError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request to {url} failed: {source}")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("request to {url} failed after {retries} retries")]
    MaxRetriesExceeded { url: String, retries: u32 },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("malformed chunk data: {0}")]
    MalformedChunk(#[from] ChunkError),

    #[error("malformed {what} response: {detail}")]
    MalformedResponse { what: &'static str, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Network-level failures worth retrying on the next scheduled run.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::HttpRequest { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            Error::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Error::MaxRetriesExceeded { .. } => true,
            _ => false,
        }
    }
}

/// Chunk data that cannot be decoded. Never guessed around: the whole chunk (and the
/// redirect carrying it) is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error(
        "chunk {chunk}: data ended at offset {offset} reading {field} ({needed} bytes needed, {available} left)"
    )]
    Truncated { chunk: u32, offset: usize, field: &'static str, needed: usize, available: usize },

    #[error("chunk {chunk}: hash length {hash_len} is outside 1..=32")]
    InvalidHashLen { chunk: u32, hash_len: usize },

    #[error("malformed chunk header '{header}'")]
    BadHeader { header: String },
}
