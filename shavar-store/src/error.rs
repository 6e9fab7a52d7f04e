use compact_str::CompactString;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("lock for list '{list}' is poisoned")]
    Poisoned { list: CompactString },

    #[error("list '{list}' is not in the watch set")]
    UnknownList { list: CompactString },

    #[error("corrupt value '{value}' under key '{key}'")]
    Corrupt { key: String, value: String },

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("invalid chunk range token '{token}'")]
    InvalidToken { token: String },

    #[error("chunk range {start}-{end} is reversed")]
    Reversed { start: u32, end: u32 },

    #[error("chunk range {start}-{end} spans more than {limit} chunks")]
    TooLarge { start: u32, end: u32, limit: u32 },
}
