//! Error types for store operations

/// Errors from credential and ephemeral store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("already exists: {0}")]
    Conflict(String),

    #[error("value is not a counter: {0}")]
    WrongType(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("ttl out of range for {key}: {ttl_secs}s")]
    TtlOutOfRange { key: String, ttl_secs: u64 },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
