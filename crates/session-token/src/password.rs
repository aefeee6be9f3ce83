//! Password hashing
//!
//! bcrypt is deliberately slow; callers on an async runtime should run these
//! functions on the blocking pool (`tokio::task::spawn_blocking`).

use crate::error::{Error, Result};

/// Work factor used when none is configured.
pub const DEFAULT_PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;

/// Lowest work factor bcrypt accepts. Only suitable for tests.
pub const MIN_PASSWORD_COST: u32 = 4;

/// Hash a password with the given bcrypt cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| Error::Hash(e.to_string()))
}

/// Check a password against a stored bcrypt hash.
///
/// A malformed stored hash is an error, not a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(|e| Error::Hash(e.to_string()))
}
