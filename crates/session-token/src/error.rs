//! Error types for token and password operations

/// Errors from minting, verifying, or hashing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token codec misconfigured: {0}")]
    Config(String),

    #[error("token encoding failed: {0}")]
    Encode(String),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token expired")]
    Expired,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
