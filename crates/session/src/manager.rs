//! Session orchestrator
//!
//! Drives register, login, refresh, and logout against the injected stores.
//!
//! Refresh is the operation that matters. The presented token's binding is
//! removed with the store's atomic `take` before anything else happens, so:
//! - two concurrent refreshes of one token produce at most one new session
//! - the old token is dead even if a later step (role lookup, minting,
//!   storing the replacement) fails
//! - a token bound to an identity that no longer exists is destroyed, not
//!   left to linger until its TTL
//!
//! Roles are always read from the credential store at issuance. Nothing about
//! the old session (its access token or its refresh binding) is trusted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde::Serialize;
use session_store::{CredentialStore, EphemeralStore};
use session_token::{
    DEFAULT_PASSWORD_COST, Principal, TokenCodec, hash_password, mint_opaque_secret, refresh_key,
    verify_password,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};

/// Password hashed at startup and checked when the identity is unknown, so a
/// failed login costs the same bcrypt work whether or not the account exists.
const DECOY_PASSWORD: &str = "decoy-password-for-unknown-identities";

/// Longest accepted refresh-token lifetime.
pub const MAX_REFRESH_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Tunables for the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of a refresh-token binding in the ephemeral store
    pub refresh_ttl: Duration,
    /// Role assigned at registration
    pub default_role: String,
    /// bcrypt work factor for new credentials
    pub password_cost: u32,
    /// Upper bound on any single store call
    pub store_timeout: Duration,
    pub rate_limit: RateLimitPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            default_role: "user".into(),
            password_cost: DEFAULT_PASSWORD_COST,
            store_timeout: Duration::from_secs(2),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

/// Bearer credentials returned by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            token_type: "bearer".into(),
            access_token,
            refresh_token,
        }
    }
}

/// The session orchestrator.
pub struct SessionManager {
    config: SessionConfig,
    codec: TokenCodec,
    credentials: Arc<dyn CredentialStore>,
    ephemeral: Arc<dyn EphemeralStore>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    decoy_hash: String,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        codec: TokenCodec,
        credentials: Arc<dyn CredentialStore>,
        ephemeral: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let decoy_hash = hash_password(DECOY_PASSWORD, config.password_cost)?;
        let limiter = RateLimiter::new(ephemeral.clone(), config.rate_limit);
        info!(
            refresh_ttl_secs = config.refresh_ttl.as_secs(),
            access_ttl_secs = codec.access_ttl().as_secs(),
            max_attempts = config.rate_limit.max_attempts,
            window_secs = config.rate_limit.window.as_secs(),
            "session manager initialized"
        );
        Ok(Self {
            config,
            codec,
            credentials,
            ephemeral,
            limiter,
            clock,
            decoy_hash,
        })
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        self.limiter.policy()
    }

    /// Create a credential with the default role.
    pub async fn register(&self, identity: &str, password: &str) -> Result<()> {
        // Cheap early exit; `create` re-checks atomically
        if self
            .bounded("find_identity", self.credentials.find_by_identity(identity))
            .await?
            .is_some()
        {
            debug!(identity, "registration conflict");
            return Err(Error::Conflict);
        }

        let hash = self.hash(password).await?;
        self.bounded(
            "create_credential",
            self.credentials
                .create(identity, &self.config.default_role, hash),
        )
        .await?;

        info!(identity, role = %self.config.default_role, "identity registered");
        Ok(())
    }

    /// Authenticate with identity and password, gated by the client's attempt count.
    pub async fn login(&self, identity: &str, password: &str, client_key: &str) -> Result<TokenPair> {
        let decision = self
            .bounded("rate_limit", self.limiter.check_and_record(client_key))
            .await?;
        if decision == RateLimitDecision::Blocked {
            warn!(client_key, "login rate limited");
            return Err(Error::RateLimited);
        }

        let record = self
            .bounded("find_identity", self.credentials.find_by_identity(identity))
            .await?;

        let stored_hash = match &record {
            Some(record) => record.password_hash.clone(),
            None => self.decoy_hash.clone(),
        };
        let matches = self.verify(password, stored_hash).await?;

        let record = match record {
            Some(record) if matches => record,
            _ => {
                info!(identity, client_key, "login rejected");
                return Err(Error::Unauthorized);
            }
        };

        let pair = self.issue_pair(&record.identity, &record.role).await?;
        info!(identity, role = %record.role, "login succeeded");
        Ok(pair)
    }

    /// Redeem a refresh token for a new pair. The presented token is spent
    /// whatever the outcome.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let key = refresh_key(refresh_token);

        let identity = match self.bounded("redeem_refresh", self.ephemeral.take(&key)).await? {
            Some(identity) => identity,
            None => {
                debug!("refresh token unknown, redeemed, expired, or revoked");
                return Err(Error::Unauthorized);
            }
        };

        let record = self
            .bounded("find_identity", self.credentials.find_by_identity(&identity))
            .await?;
        let Some(record) = record else {
            warn!(identity, "refresh token bound to a vanished identity, discarded");
            return Err(Error::Unauthorized);
        };

        let pair = self.issue_pair(&record.identity, &record.role).await?;
        info!(identity, role = %record.role, "refresh token rotated");
        Ok(pair)
    }

    /// Revoke a refresh token. Unknown tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let key = refresh_key(refresh_token);
        let revoked = self
            .bounded("revoke_refresh", self.ephemeral.delete(&key))
            .await?;
        debug!(revoked, "logout");
        Ok(())
    }

    /// Verify an access token at the current time.
    pub fn authenticate(&self, access_token: &str) -> Result<Principal> {
        Ok(self.codec.verify(access_token, self.clock.now())?)
    }

    async fn issue_pair(&self, identity: &str, role: &str) -> Result<TokenPair> {
        let access = self.codec.mint(identity, role, self.clock.now())?;
        let refresh = mint_opaque_secret();

        self.bounded(
            "store_refresh",
            self.ephemeral
                .set(&refresh_key(&refresh), identity, self.config.refresh_ttl),
        )
        .await?;

        Ok(TokenPair::bearer(access.token, refresh))
    }

    /// Run a store call under `store_timeout`, reporting expiry as `Unavailable`.
    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = session_store::Result<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(|e| {
                warn!(op, error = %e, "store call failed");
                Error::from(e)
            }),
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.config.store_timeout.as_millis() as u64,
                    "store call timed out"
                );
                Err(Error::Unavailable(format!("{op} timed out")))
            }
        }
    }

    async fn hash(&self, password: &str) -> Result<String> {
        let password = Secret::new(password.to_owned());
        let cost = self.config.password_cost;
        tokio::task::spawn_blocking(move || hash_password(password.expose(), cost))
            .await
            .map_err(|e| Error::Internal(format!("hashing task failed: {e}")))?
            .map_err(Error::from)
    }

    async fn verify(&self, password: &str, stored_hash: String) -> Result<bool> {
        let password = Secret::new(password.to_owned());
        tokio::task::spawn_blocking(move || verify_password(password.expose(), &stored_hash))
            .await
            .map_err(|e| Error::Internal(format!("verification task failed: {e}")))?
            .map_err(Error::from)
    }
}
