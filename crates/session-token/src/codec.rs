//! Signed access token codec
//!
//! Access tokens are compact JWTs signed with a shared HMAC key. They carry
//! everything needed to authorize a request (`sub`, `role`, `iat`, `exp`), so
//! verification never consults storage.
//!
//! Expiry is checked here rather than inside `jsonwebtoken`: the library
//! compares against the wall clock with a default leeway, while `verify` must
//! be a pure function of the token bytes and the caller-supplied `now`.

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Longest accepted access token lifetime.
pub const MAX_ACCESS_TTL: Duration = Duration::from_secs(24 * 3600);

/// Claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity the token was issued to
    pub sub: String,
    /// Role read from the credential store at issuance
    pub role: String,
    /// Issued-at, unix seconds
    pub iat: u64,
    /// Expires-at, unix seconds
    pub exp: u64,
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    /// Absolute expiry in unix seconds
    pub expires_at: u64,
}

/// The authenticated caller extracted from a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub role: String,
}

/// Parse an algorithm name from configuration.
///
/// Only the HMAC family is accepted: the codec is keyed by a single shared
/// secret and has no notion of key pairs.
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    let algorithm: Algorithm = name
        .parse()
        .map_err(|_| Error::Config(format!("unknown token algorithm: {name}")))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(Error::Config(format!(
            "token algorithm {other:?} is not supported, use HS256, HS384 or HS512"
        ))),
    }
}

/// Mints and verifies access tokens with a fixed algorithm, key, and lifetime.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
}

impl TokenCodec {
    pub fn new(signing_key: &[u8], algorithm: Algorithm, access_ttl: Duration) -> Result<Self> {
        if signing_key.is_empty() {
            return Err(Error::Config("signing key must not be empty".into()));
        }
        if access_ttl.as_secs() == 0 {
            return Err(Error::Config(
                "access token lifetime must be at least one second".into(),
            ));
        }
        if access_ttl > MAX_ACCESS_TTL {
            return Err(Error::Config(format!(
                "access token lifetime must not exceed {}s",
                MAX_ACCESS_TTL.as_secs()
            )));
        }
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(Error::Config(format!(
                "token algorithm {algorithm:?} is not supported"
            )));
        }

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(signing_key),
            decoding: DecodingKey::from_secret(signing_key),
            access_ttl,
        })
    }

    /// Lifetime applied to every minted token.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign a token for `subject` with `role`, valid from `now` (unix seconds).
    pub fn mint(&self, subject: &str, role: &str, now: u64) -> Result<AccessToken> {
        let expires_at = now
            .checked_add(self.access_ttl.as_secs())
            .ok_or_else(|| Error::Encode(format!("expiry overflows from now={now}")))?;
        let claims = Claims {
            sub: subject.to_owned(),
            role: role.to_owned(),
            iat: now,
            exp: expires_at,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| Error::Encode(e.to_string()))?;

        debug!(subject, role, expires_at, "minted access token");
        Ok(AccessToken { token, expires_at })
    }

    /// Verify signature and claims, then reject the token once `now >= exp`.
    pub fn verify(&self, token: &str, now: u64) -> Result<Principal> {
        let claims = self.decode_claims(token)?;
        if now >= claims.exp {
            return Err(Error::Expired);
        }
        Ok(Principal {
            subject: claims.sub,
            role: claims.role,
        })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| Error::Invalid(e.to_string()))
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
