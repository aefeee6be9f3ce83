//! Storage contracts for the session lifecycle
//!
//! Two stores sit behind the session orchestrator:
//! - `EphemeralStore`: short-lived keyed values with store-managed TTL. Holds
//!   refresh-token bindings and login attempt counters. `MemoryStore` is the
//!   in-process implementation.
//! - `CredentialStore`: durable user records (identity, role, password hash).
//!   `FileCredentialStore` persists them to a JSON file.
//!
//! Both traits return boxed futures so the orchestrator can hold them as
//! `Arc<dyn ...>` and tests can substitute their own doubles.

pub mod credentials;
pub mod ephemeral;
pub mod error;
pub mod sweep;

pub use credentials::{CredentialRecord, CredentialStore, FileCredentialStore};
pub use ephemeral::{EphemeralStore, MemoryStore};
pub use error::{Error, Result};
pub use sweep::spawn_sweep_task;

use std::future::Future;
use std::pin::Pin;

/// Future returned by store trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
