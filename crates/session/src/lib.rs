//! Session lifecycle orchestration
//!
//! Issues, rotates, and revokes credentials for a user-facing service. The
//! `SessionManager` owns no cross-request state of its own: refresh-token
//! bindings and login counters live in the `EphemeralStore`, user records in
//! the `CredentialStore`, and both are injected at construction.
//!
//! Refresh token lifecycle:
//! 1. Login mints an access token and a refresh secret → binding `ISSUED`
//! 2. Refresh atomically takes the binding → `REDEEMED`, a new pair is issued
//! 3. The store TTL elapses first → `EXPIRED`
//! 4. Logout deletes the binding → `REVOKED`
//!
//! Every state but `ISSUED` is terminal, and all three terminal states look
//! identical to a caller: the token is simply unknown.

pub mod clock;
pub mod error;
pub mod manager;
pub mod rate_limit;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use manager::{MAX_REFRESH_TTL, SessionConfig, SessionManager, TokenPair};
pub use rate_limit::{MAX_WINDOW, RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use session_token::Principal;
