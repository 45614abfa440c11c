//! Bridge configuration.
//!
//! Configuration is loaded from `BRIDGE_*` environment variables with
//! defaults suitable for local development.

use bridge_auth::{
    normalize_host, CachedSecret, CredentialSource, EnvSecretSource, LoginCredentials,
    SecretCredentials, StaticCredentials,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },

    /// HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Bridge configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host used when a caller does not name one.
    pub default_host: String,

    /// Extra known hosts (refreshed in the background, allowed in strict mode).
    pub hosts: Vec<String>,

    /// Reject hosts that are neither the default nor listed in `hosts`.
    pub strict_hosts: bool,

    /// Static login username.
    pub username: Option<String>,

    /// Static login password.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Name of a secret holding `{"username","password"}` JSON.
    pub credentials_secret: Option<String>,

    /// Secret cache TTL in seconds.
    pub secret_ttl_secs: u64,

    /// Per-request deadline in seconds.
    pub timeout_secs: u64,

    /// Session cache TTL in seconds (0 disables expiry).
    pub session_ttl_secs: u64,

    /// Library payload cache TTL in seconds (0 disables the cache).
    pub library_cache_secs: u64,

    /// Path of the JSON token store; in-memory when unset.
    pub token_store: Option<PathBuf>,

    /// Token refresh interval in seconds (0 disables the loop).
    pub refresh_interval_secs: u64,

    /// Bind address for the HTTP server.
    pub bind: String,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("default_host", &self.default_host)
            .field("hosts", &self.hosts)
            .field("strict_hosts", &self.strict_hosts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("credentials_secret", &self.credentials_secret)
            .field("secret_ttl_secs", &self.secret_ttl_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("library_cache_secs", &self.library_cache_secs)
            .field("token_store", &self.token_store)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("bind", &self.bind)
            .finish()
    }
}

impl Default for BridgeConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            default_host: "http://localhost:8080".to_string(),
            hosts: Vec::new(),
            strict_hosts: false,
            username: None,
            password: None,
            credentials_secret: None,
            secret_ttl_secs: 300,
            timeout_secs: 30,
            session_ttl_secs: 300,
            library_cache_secs: 0,
            token_store: None,
            refresh_interval_secs: 12 * 60 * 60,
            bind: "127.0.0.1:3030".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BRIDGE_DEFAULT_HOST`: host used when none is given (default: http://localhost:8080)
    /// - `BRIDGE_HOSTS`: comma-separated extra known hosts
    /// - `BRIDGE_STRICT_HOSTS`: only allow known hosts (default: false)
    /// - `BRIDGE_USERNAME` / `BRIDGE_PASSWORD`: static login credentials
    /// - `BRIDGE_CREDENTIALS_SECRET`: secret name holding credentials JSON
    /// - `BRIDGE_SECRET_TTL_SECS`: secret cache TTL (default: 300)
    /// - `BRIDGE_TIMEOUT_SECS`: request deadline (default: 30)
    /// - `BRIDGE_SESSION_TTL_SECS`: session cache TTL, 0 = no expiry (default: 300)
    /// - `BRIDGE_LIBRARY_CACHE_SECS`: payload cache TTL, 0 = disabled (default: 0)
    /// - `BRIDGE_TOKEN_STORE`: token store file path
    /// - `BRIDGE_REFRESH_INTERVAL_SECS`: refresh interval, 0 = disabled (default: 43200)
    /// - `BRIDGE_BIND`: HTTP bind address (default: 127.0.0.1:3030)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, fallback: u64| {
            var(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            default_host: var("BRIDGE_DEFAULT_HOST").unwrap_or(default.default_host),
            hosts: var("BRIDGE_HOSTS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            strict_hosts: var("BRIDGE_STRICT_HOSTS")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.strict_hosts),
            username: var("BRIDGE_USERNAME"),
            password: lookup("BRIDGE_PASSWORD"),
            credentials_secret: var("BRIDGE_CREDENTIALS_SECRET"),
            secret_ttl_secs: number("BRIDGE_SECRET_TTL_SECS", default.secret_ttl_secs),
            timeout_secs: number("BRIDGE_TIMEOUT_SECS", default.timeout_secs),
            session_ttl_secs: number("BRIDGE_SESSION_TTL_SECS", default.session_ttl_secs),
            library_cache_secs: number("BRIDGE_LIBRARY_CACHE_SECS", default.library_cache_secs),
            token_store: var("BRIDGE_TOKEN_STORE").map(PathBuf::from),
            refresh_interval_secs: number(
                "BRIDGE_REFRESH_INTERVAL_SECS",
                default.refresh_interval_secs,
            ),
            bind: var("BRIDGE_BIND").unwrap_or(default.bind),
        }
    }

    /// Request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Session cache TTL, `None` when expiry is disabled.
    pub fn session_ttl(&self) -> Option<Duration> {
        non_zero(self.session_ttl_secs)
    }

    /// Payload cache TTL, `None` when the cache is disabled.
    pub fn library_cache_ttl(&self) -> Option<Duration> {
        non_zero(self.library_cache_secs)
    }

    /// Refresh interval, `None` when the loop is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        non_zero(self.refresh_interval_secs)
    }

    /// Secret cache TTL.
    pub fn secret_ttl(&self) -> Duration {
        Duration::from_secs(self.secret_ttl_secs)
    }

    /// Default host followed by the extra hosts, normalized and deduplicated.
    pub fn known_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::new();
        for host in std::iter::once(&self.default_host).chain(self.hosts.iter()) {
            let host = normalize_host(host);
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        hosts
    }

    /// Validate that the configuration can serve requests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.default_host) {
            return Err(ConfigError::InvalidValue {
                key: "BRIDGE_DEFAULT_HOST".to_string(),
                message: format!("expected an http(s) URL, got '{}'", self.default_host),
            });
        }
        if let Some(bad) = self.hosts.iter().find(|h| !is_http_url(h)) {
            return Err(ConfigError::InvalidValue {
                key: "BRIDGE_HOSTS".to_string(),
                message: format!("expected an http(s) URL, got '{}'", bad),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BRIDGE_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.credentials_secret.is_some() {
            return Ok(());
        }
        match (&self.username, &self.password) {
            (Some(_), Some(_)) => Ok(()),
            (Some(_), None) => Err(ConfigError::MissingEnvVar("BRIDGE_PASSWORD".to_string())),
            (None, _) => Err(ConfigError::MissingEnvVar(
                "BRIDGE_USERNAME (or BRIDGE_CREDENTIALS_SECRET)".to_string(),
            )),
        }
    }

    /// Build the login credential source this configuration describes.
    ///
    /// A configured secret takes precedence over static credentials.
    pub fn credential_source(&self) -> Arc<dyn CredentialSource> {
        if let Some(ref name) = self.credentials_secret {
            let secret = CachedSecret::new(
                Arc::new(EnvSecretSource::new()),
                name.clone(),
                self.secret_ttl(),
            );
            return Arc::new(SecretCredentials::new(secret));
        }

        let mut source = StaticCredentials::new();
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            source = source.with_default(LoginCredentials::new(username, password));
        }
        Arc::new(source)
    }
}

/// Whether `host` is usable as a base URL.
pub fn is_http_url(host: &str) -> bool {
    let host = host.trim();
    ["http://", "https://"].iter().any(|scheme| {
        host.len() > scheme.len()
            && host
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Build a full URL by appending a path to a host base URL.
pub fn endpoint_url(host: &str, path: &str) -> String {
    let base = host.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

fn non_zero(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
