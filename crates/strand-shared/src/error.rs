use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid phrase: {0}")]
    InvalidPhrase(String),

    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Failed to generate keypair")]
    GenerationFailed,

    #[error("Key file error: {0}")]
    KeyFile(String),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Announcement is not valid UTF-8")]
    NotUtf8,

    #[error("Unknown bundle part: {0}")]
    UnknownPart(String),

    #[error("Malformed content path: {0}")]
    BadPath(String),

    #[error("Metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),
}
