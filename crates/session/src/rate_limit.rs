//! Login attempt limiting per client
//!
//! Fixed-window counter kept in the ephemeral store. The first attempt from a
//! client opens a window of `policy.window`; every attempt in that window,
//! blocked ones included, bumps the counter. Once the count passes
//! `max_attempts` the client is blocked until the store expires the counter.
//! There is no reset operation.

use std::sync::Arc;
use std::time::Duration;

use session_store::EphemeralStore;
use tracing::debug;

/// Prefix for attempt counters in the ephemeral store.
const ATTEMPTS_KEY_PREFIX: &str = "login_attempts:";

/// Longest accepted attempt window.
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_attempts: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked,
}

/// Per-client attempt gate backed by the store's atomic increment.
pub struct RateLimiter {
    store: Arc<dyn EphemeralStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn EphemeralStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Record one attempt for `client_key` and decide whether it may proceed.
    pub async fn check_and_record(
        &self,
        client_key: &str,
    ) -> session_store::Result<RateLimitDecision> {
        let key = format!("{ATTEMPTS_KEY_PREFIX}{client_key}");
        let count = self.store.increment(&key, self.policy.window).await?;

        if count > self.policy.max_attempts {
            debug!(
                client_key,
                count,
                max_attempts = self.policy.max_attempts,
                "attempt over limit"
            );
            return Ok(RateLimitDecision::Blocked);
        }
        Ok(RateLimitDecision::Allowed)
    }
}
