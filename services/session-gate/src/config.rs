//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The signing key is loaded from SESSION_SIGNING_KEY or signing_key_file,
//! never stored in the TOML directly to avoid leaking secrets.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderName;
use common::Secret;
use serde::Deserialize;
use session::{MAX_REFRESH_TTL, MAX_WINDOW, RateLimitPolicy, SessionConfig};
use session_token::{Algorithm, MAX_ACCESS_TTL, MIN_PASSWORD_COST, parse_algorithm};

use crate::client_key::ClientKeyPolicy;

/// Env var holding the token signing key.
pub const SIGNING_KEY_ENV: &str = "SESSION_SIGNING_KEY";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub client_key: ClientKeyConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Access and refresh token settings
#[derive(Debug, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
    #[serde(skip)]
    pub signing_key: Option<Secret<String>>,
    /// Path to a file containing the signing key (alternative to SESSION_SIGNING_KEY)
    #[serde(default)]
    pub signing_key_file: Option<PathBuf>,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            signing_key: None,
            signing_key_file: None,
        }
    }
}

/// Login attempt limiting
#[derive(Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window")]
    pub window_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Where the rate limiter's client key comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKeySource {
    Peer,
    Header,
}

#[derive(Debug, Deserialize)]
pub struct ClientKeyConfig {
    #[serde(default = "default_client_key_source")]
    pub source: ClientKeySource,
    #[serde(default = "default_client_key_header")]
    pub header: String,
}

impl Default for ClientKeyConfig {
    fn default() -> Self {
        Self {
            source: default_client_key_source(),
            header: default_client_key_header(),
        }
    }
}

/// Ephemeral store behaviour
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Credential store settings
#[derive(Debug, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_role")]
    pub default_role: String,
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            default_role: default_role(),
            password_cost: default_password_cost(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_algorithm() -> String {
    "HS256".into()
}

fn default_access_ttl() -> u64 {
    900
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 3600
}

fn default_window() -> u64 {
    60
}

fn default_max_attempts() -> u64 {
    5
}

fn default_client_key_source() -> ClientKeySource {
    ClientKeySource::Peer
}

fn default_client_key_header() -> String {
    "x-forwarded-for".into()
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_role() -> String {
    "user".into()
}

fn default_password_cost() -> u32 {
    session_token::DEFAULT_PASSWORD_COST
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Signing key resolution order:
    /// 1. SESSION_SIGNING_KEY env var
    /// 2. signing_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config.validate()?;

        if let Ok(key) = std::env::var(SIGNING_KEY_ENV) {
            if !key.is_empty() {
                config.tokens.signing_key = Some(Secret::new(key));
            }
        }
        if config.tokens.signing_key.is_none() {
            if let Some(ref key_file) = config.tokens.signing_key_file {
                let key = std::fs::read_to_string(key_file).map_err(|e| {
                    common::Error::Config(format!(
                        "failed to read signing_key_file {}: {e}",
                        key_file.display()
                    ))
                })?;
                let key = key.trim().to_owned();
                if !key.is_empty() {
                    config.tokens.signing_key = Some(Secret::new(key));
                }
            }
        }

        if config.tokens.signing_key.is_none() {
            return Err(common::Error::Config(format!(
                "no signing key: set {SIGNING_KEY_ENV} or tokens.signing_key_file"
            )));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let nonzero = [
            ("server.max_connections", self.server.max_connections as u64),
            ("tokens.access_ttl_secs", self.tokens.access_ttl_secs),
            ("tokens.refresh_ttl_secs", self.tokens.refresh_ttl_secs),
            ("rate_limit.window_secs", self.rate_limit.window_secs),
            ("rate_limit.max_attempts", self.rate_limit.max_attempts),
            ("store.timeout_ms", self.store.timeout_ms),
            ("store.sweep_interval_secs", self.store.sweep_interval_secs),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        let upper = [
            ("tokens.access_ttl_secs", self.tokens.access_ttl_secs, MAX_ACCESS_TTL),
            ("tokens.refresh_ttl_secs", self.tokens.refresh_ttl_secs, MAX_REFRESH_TTL),
            ("rate_limit.window_secs", self.rate_limit.window_secs, MAX_WINDOW),
        ];
        for (name, value, max) in upper {
            if value > max.as_secs() {
                return Err(common::Error::Config(format!(
                    "{name} must not exceed {}",
                    max.as_secs()
                )));
            }
        }

        self.algorithm()?;

        if self.accounts.password_cost < MIN_PASSWORD_COST {
            return Err(common::Error::Config(format!(
                "accounts.password_cost must be at least {MIN_PASSWORD_COST}"
            )));
        }

        if self.accounts.default_role.trim().is_empty() {
            return Err(common::Error::Config(
                "accounts.default_role must not be empty".into(),
            ));
        }

        self.client_key_policy()?;
        Ok(())
    }

    /// Signing algorithm named in `tokens.algorithm`.
    pub fn algorithm(&self) -> common::Result<Algorithm> {
        parse_algorithm(&self.tokens.algorithm)
            .map_err(|e| common::Error::Config(format!("tokens.algorithm: {e}")))
    }

    pub fn client_key_policy(&self) -> common::Result<ClientKeyPolicy> {
        match self.client_key.source {
            ClientKeySource::Peer => Ok(ClientKeyPolicy::Peer),
            ClientKeySource::Header => {
                let name = HeaderName::try_from(self.client_key.header.as_str()).map_err(|e| {
                    common::Error::Config(format!(
                        "client_key.header {:?} is not a valid header name: {e}",
                        self.client_key.header
                    ))
                })?;
                Ok(ClientKeyPolicy::Header(name))
            }
        }
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.tokens.access_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.store.sweep_interval_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            refresh_ttl: Duration::from_secs(self.tokens.refresh_ttl_secs),
            default_role: self.accounts.default_role.clone(),
            password_cost: self.accounts.password_cost,
            store_timeout: Duration::from_millis(self.store.timeout_ms),
            rate_limit: RateLimitPolicy {
                window: Duration::from_secs(self.rate_limit.window_secs),
                max_attempts: self.rate_limit.max_attempts,
            },
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-gate.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn minimal_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8080"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("session-gate.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env(SIGNING_KEY_ENV) };

        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.algorithm().unwrap(), Algorithm::HS256);
        assert_eq!(config.access_ttl(), Duration::from_secs(900));
        assert_eq!(config.tokens.refresh_ttl_secs, 604_800);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert_eq!(config.client_key_policy().unwrap(), ClientKeyPolicy::Peer);
        assert_eq!(config.store.timeout_ms, 2000);
        assert_eq!(config.accounts.default_role, "user");
        assert_eq!(
            config.tokens.signing_key.as_ref().unwrap().expose(),
            "env-key"
        );
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "0.0.0.0:9000"
max_connections = 64

[tokens]
algorithm = "HS512"
access_ttl_secs = 300
refresh_ttl_secs = 3600

[rate_limit]
window_secs = 120
max_attempts = 3

[client_key]
source = "header"
header = "x-real-ip"

[store]
timeout_ms = 500
sweep_interval_secs = 30

[accounts]
credentials_path = "/var/lib/session-gate/credentials.json"
default_role = "member"
password_cost = 10
"#,
        );

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env(SIGNING_KEY_ENV) };

        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.algorithm().unwrap(), Algorithm::HS512);
        assert_eq!(
            config.client_key_policy().unwrap(),
            ClientKeyPolicy::Header(HeaderName::from_static("x-real-ip"))
        );

        let session = config.session_config();
        assert_eq!(session.refresh_ttl, Duration::from_secs(3600));
        assert_eq!(session.default_role, "member");
        assert_eq!(session.password_cost, 10);
        assert_eq!(session.store_timeout, Duration::from_millis(500));
        assert_eq!(session.rate_limit.window, Duration::from_secs(120));
        assert_eq!(session.rate_limit.max_attempts, 3);
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_signing_key_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, minimal_toml());

        unsafe { remove_env(SIGNING_KEY_ENV) };
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("no signing key"), "got: {err}");
    }

    #[test]
    fn test_signing_key_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signing_key");
        std::fs::write(&key_path, "file-key\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_key_file = "{}"
"#,
                key_path.display()
            ),
        );

        unsafe { remove_env(SIGNING_KEY_ENV) };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.tokens.signing_key.as_ref().unwrap().expose(),
            "file-key"
        );
    }

    #[test]
    fn test_signing_key_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signing_key");
        std::fs::write(&key_path, "file-key").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_key_file = "{}"
"#,
                key_path.display()
            ),
        );

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env(SIGNING_KEY_ENV) };
        assert_eq!(
            config.tokens.signing_key.as_ref().unwrap().expose(),
            "env-key"
        );
    }

    #[test]
    fn test_signing_key_file_nonexistent_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_key_file = "/nonexistent/path/signing_key"
"#,
        );

        unsafe { remove_env(SIGNING_KEY_ENV) };
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_signing_key_file_whitespace_only_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("signing_key");
        std::fs::write(&key_path, "  \n  ").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_key_file = "{}"
"#,
                key_path.display()
            ),
        );

        unsafe { remove_env(SIGNING_KEY_ENV) };
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let cases = [
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\nmax_connections = 0\n", "server.max_connections"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[tokens]\naccess_ttl_secs = 0\n", "tokens.access_ttl_secs"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[tokens]\nrefresh_ttl_secs = 0\n", "tokens.refresh_ttl_secs"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[rate_limit]\nwindow_secs = 0\n", "rate_limit.window_secs"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[rate_limit]\nmax_attempts = 0\n", "rate_limit.max_attempts"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[store]\ntimeout_ms = 0\n", "store.timeout_ms"),
        ];

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        for (contents, field) in cases {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, contents);
            let err = Config::load(&path).unwrap_err().to_string();
            assert!(err.contains(field), "expected {field} in error, got: {err}");
        }
        unsafe { remove_env(SIGNING_KEY_ENV) };
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let cases = [
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[tokens]\naccess_ttl_secs = 86401\n", "tokens.access_ttl_secs"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[tokens]\nrefresh_ttl_secs = 9223372036854775807\n", "tokens.refresh_ttl_secs"),
            ("[server]\nlisten_addr = \"127.0.0.1:8080\"\n[rate_limit]\nwindow_secs = 9223372036854775807\n", "rate_limit.window_secs"),
        ];

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        for (contents, field) in cases {
            let dir = tempfile::tempdir().unwrap();
            let path = write_config(&dir, contents);
            let err = Config::load(&path).unwrap_err().to_string();
            assert!(
                err.contains(field) && err.contains("must not exceed"),
                "expected {field} upper bound in error, got: {err}"
            );
        }
        unsafe { remove_env(SIGNING_KEY_ENV) };
    }

    #[test]
    fn test_durations_at_upper_bound_accepted() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n[tokens]\naccess_ttl_secs = 86400\nrefresh_ttl_secs = 31536000\n[rate_limit]\nwindow_secs = 86400\n",
        );

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let result = Config::load(&path);
        unsafe { remove_env(SIGNING_KEY_ENV) };
        assert!(result.is_ok());
    }

    #[test]
    fn test_asymmetric_algorithm_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n[tokens]\nalgorithm = \"RS256\"\n",
        );

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let result = Config::load(&path);
        unsafe { remove_env(SIGNING_KEY_ENV) };

        let err = result.unwrap_err().to_string();
        assert!(err.contains("tokens.algorithm"), "got: {err}");
    }

    #[test]
    fn test_low_password_cost_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n[accounts]\npassword_cost = 2\n",
        );

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let result = Config::load(&path);
        unsafe { remove_env(SIGNING_KEY_ENV) };
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_client_key_header_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n[client_key]\nsource = \"header\"\nheader = \"bad header\"\n",
        );

        unsafe { set_env(SIGNING_KEY_ENV, "env-key") };
        let result = Config::load(&path);
        unsafe { remove_env(SIGNING_KEY_ENV) };

        let err = result.unwrap_err().to_string();
        assert!(err.contains("client_key.header"), "got: {err}");
    }

    #[test]
    fn test_unknown_client_key_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten_addr = \"127.0.0.1:8080\"\n[client_key]\nsource = \"cookie\"\n",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("session-gate.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }
}
