//! Credential storage for user records
//!
//! `FileCredentialStore` keeps a JSON file mapping identities to their
//! credential record. All writes use atomic temp-file + rename to prevent
//! corruption on crash. A tokio Mutex serializes writers, which also makes
//! `create` an atomic check-and-insert: two registrations of the same identity
//! cannot both succeed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::error::{Error, Result};

/// A single user's stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub identity: String,
    pub role: String,
    /// bcrypt hash; never the raw password
    pub password_hash: String,
    /// Creation time as unix seconds
    pub created_at: u64,
}

/// Contract for the durable credential store.
pub trait CredentialStore: Send + Sync {
    fn find_by_identity<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<CredentialRecord>>>;

    /// Insert a new record. Fails with `Conflict` if the identity exists.
    fn create<'a>(
        &'a self,
        identity: &'a str,
        role: &'a str,
        password_hash: String,
    ) -> BoxFuture<'a, Result<CredentialRecord>>;
}

/// JSON-file backed credential store.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, CredentialRecord>>,
}

impl FileCredentialStore {
    /// Load records from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// users).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let records: HashMap<String, CredentialRecord> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), users = records.len(), "loaded credentials");
            records
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let store = HashMap::new();
            write_atomic(&path, &store).await?;
            store
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Change the role of an existing identity and persist.
    ///
    /// Takes effect on the identity's next login or refresh; tokens already
    /// minted keep the role they were issued with until they expire.
    pub async fn update_role(&self, identity: &str, role: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .get_mut(identity)
            .ok_or_else(|| Error::Io(format!("identity {identity} not in credential store")))?;
        let previous = std::mem::replace(&mut record.role, role.to_owned());

        // Restore the old role if the change can't be persisted
        if let Err(e) = write_atomic(&self.path, &state).await {
            if let Some(record) = state.get_mut(identity) {
                record.role = previous;
            }
            return Err(e);
        }
        debug!(identity, role, "updated role");
        Ok(())
    }

    /// Remove a record and persist. Returns the removed record if it existed.
    pub async fn remove(&self, identity: &str) -> Result<Option<CredentialRecord>> {
        let mut state = self.state.lock().await;
        let removed = state.remove(identity);
        if removed.is_some() {
            debug!(identity, "removed credential");
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CredentialStore for FileCredentialStore {
    fn find_by_identity<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<CredentialRecord>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(identity).cloned())
        })
    }

    fn create<'a>(
        &'a self,
        identity: &'a str,
        role: &'a str,
        password_hash: String,
    ) -> BoxFuture<'a, Result<CredentialRecord>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.contains_key(identity) {
                return Err(Error::Conflict(identity.to_owned()));
            }

            let record = CredentialRecord {
                identity: identity.to_owned(),
                role: role.to_owned(),
                password_hash,
                created_at: unix_now(),
            };
            state.insert(identity.to_owned(), record.clone());

            // Roll back the in-memory insert if it can't be persisted
            if let Err(e) = write_atomic(&self.path, &state).await {
                state.remove(identity);
                return Err(e);
            }
            debug!(identity, role, "created credential");
            Ok(record)
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Write records to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains password hashes.
async fn write_atomic(path: &Path, data: &HashMap<String, CredentialRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
