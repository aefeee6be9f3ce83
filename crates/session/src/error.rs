//! Error taxonomy surfaced to callers of the session manager

/// Errors from session operations.
///
/// `Unauthorized` deliberately covers bad credentials, unknown identities,
/// and refresh tokens that were never issued, already redeemed, expired, or
/// revoked. `Unavailable` is reserved for store failures and timeouts so a
/// flaky backend is never reported as a credential problem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("identity already registered")]
    Conflict,

    #[error("unauthorized")]
    Unauthorized,

    #[error("too many login attempts")]
    RateLimited,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<session_store::Error> for Error {
    fn from(err: session_store::Error) -> Self {
        match err {
            session_store::Error::Conflict(_) => Error::Conflict,
            session_store::Error::Io(msg) => Error::Unavailable(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<session_token::Error> for Error {
    fn from(err: session_token::Error) -> Self {
        match err {
            session_token::Error::Invalid(msg) => Error::Invalid(msg),
            session_token::Error::Expired => Error::Invalid("token expired".into()),
            other => Error::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            Error::from(session_store::Error::Conflict("alice".into())),
            Error::Conflict
        ));
        assert!(matches!(
            Error::from(session_store::Error::Io("disk full".into())),
            Error::Unavailable(_)
        ));
        assert!(matches!(
            Error::from(session_store::Error::WrongType("k".into())),
            Error::Internal(_)
        ));
        assert!(matches!(
            Error::from(session_store::Error::TtlOutOfRange {
                key: "refresh:abc".into(),
                ttl_secs: u64::MAX,
            }),
            Error::Internal(_)
        ));
    }

    #[test]
    fn token_errors_map_to_invalid() {
        assert!(matches!(
            Error::from(session_token::Error::Expired),
            Error::Invalid(_)
        ));
        assert!(matches!(
            Error::from(session_token::Error::Invalid("InvalidSignature".into())),
            Error::Invalid(_)
        ));
        assert!(matches!(
            Error::from(session_token::Error::Encode("boom".into())),
            Error::Internal(_)
        ));
    }
}
