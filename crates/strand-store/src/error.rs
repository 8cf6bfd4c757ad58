use strand_shared::error::IdentityError;
use thiserror::Error;

/// Errors produced by the registry and its database.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The name is already bound to another thread, or the thread is
    /// already known under another name.
    #[error("Thread name already in use: {0}")]
    DuplicateName(String),

    /// An update with this content id is already in the index.
    #[error("Update already indexed: {0}")]
    AlreadyIndexed(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Metadata column encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Hex decoding error.
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

/// Errors produced by the content-addressed object store.
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid content id: {0}")]
    InvalidId(String),

    #[error("Object {0} is not a directory node")]
    NotADirectory(String),

    #[error("Directory {cid} has no child named {child}")]
    NoSuchChild { cid: String, child: String },

    #[error("Malformed object path: {0}")]
    BadPath(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Object too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Directory encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote fetch failed: {0}")]
    Remote(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
