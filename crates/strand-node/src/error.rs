use strand_net::BusError;
use strand_shared::error::{CryptoError, IdentityError, ProtocolError};
use strand_store::{ObjectError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// Thread, update or object absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lost an indexing race; callers in the sync path treat this as done.
    #[error("Already indexed: {0}")]
    AlreadyIndexed(String),

    #[error("Decryption failed: wrong thread key or corrupted content")]
    DecryptionFailed,

    #[error("Fetch of {0} timed out")]
    FetchTimeout(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Node is shutting down")]
    ShuttingDown,

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Object store error: {0}")]
    Object(ObjectError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for NodeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => NodeError::NotFound("record".to_string()),
            StoreError::AlreadyIndexed(cid) => NodeError::AlreadyIndexed(cid),
            StoreError::Identity(e) => NodeError::Identity(e),
            other => NodeError::Store(other),
        }
    }
}

impl From<ObjectError> for NodeError {
    fn from(e: ObjectError) -> Self {
        match e {
            ObjectError::NotFound(cid) => NodeError::NotFound(cid),
            other => NodeError::Object(other),
        }
    }
}

impl From<CryptoError> for NodeError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed => NodeError::DecryptionFailed,
            other => NodeError::Crypto(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
