//! Session token primitives
//!
//! Stateless building blocks for the session lifecycle: signed access tokens,
//! opaque refresh secrets, and password hashes. Nothing in this crate touches
//! storage, so every function is safe to call from any number of tasks at once.
//!
//! Token flow:
//! 1. Login mints an access token via `TokenCodec::mint()`
//! 2. A refresh secret comes from `opaque::mint_opaque_secret()`
//! 3. The refresh secret is stored under `opaque::refresh_key()`, never raw
//! 4. Protected requests call `TokenCodec::verify()` with the current time

pub mod codec;
pub mod error;
pub mod opaque;
pub mod password;

pub use codec::{AccessToken, Claims, MAX_ACCESS_TTL, Principal, TokenCodec, parse_algorithm};
pub use error::{Error, Result};
pub use jsonwebtoken::Algorithm;
pub use opaque::{fingerprint, mint_opaque_secret, refresh_key};
pub use password::{DEFAULT_PASSWORD_COST, MIN_PASSWORD_COST, hash_password, verify_password};
