//! Opaque refresh secrets
//!
//! A refresh token is a random string with no internal structure. The store
//! never sees it directly: records are keyed by a SHA-256 fingerprint, so a
//! dump of the ephemeral store cannot be replayed as live refresh tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Bytes of entropy in each refresh secret.
const SECRET_BYTES: usize = 48;

/// Prefix for refresh-token records in the ephemeral store.
pub const REFRESH_KEY_PREFIX: &str = "refresh:";

/// Generate a cryptographically random refresh secret.
///
/// 48 random bytes encoded as URL-safe base64 without padding (64 chars).
/// 384 bits keeps collisions negligible for any realistic token volume.
pub fn mint_opaque_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(secret))`
pub fn fingerprint(secret: &str) -> String {
    let hash = Sha256::digest(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Ephemeral store key under which a refresh secret's binding is recorded.
pub fn refresh_key(secret: &str) -> String {
    format!("{REFRESH_KEY_PREFIX}{}", fingerprint(secret))
}
