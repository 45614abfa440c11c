//! Login credential sources
//!
//! The authenticator never reads configuration itself. It asks a
//! [`CredentialSource`] for the username/password to use against a host.

use crate::error::{AuthError, AuthResult};
use crate::secrets::CachedSecret;
use crate::session::normalize_host;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

/// Username/password pair submitted to a host's login endpoint.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LoginCredentials {
    /// Account name
    pub username: String,

    /// Account password
    pub password: String,
}

impl LoginCredentials {
    /// Create a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse `{"username": "...", "password": "..."}` secret content.
    pub fn from_secret_json(name: &str, raw: &str) -> AuthResult<Self> {
        let creds: LoginCredentials = serde_json::from_str(raw)
            .map_err(|e| AuthError::InvalidSecret(format!("{}: {}", name, e)))?;
        if creds.username.is_empty() {
            return Err(AuthError::InvalidSecret(format!(
                "{}: empty username",
                name
            )));
        }
        Ok(creds)
    }
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Resolves the login credentials to use for a host.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Credentials for `host`, or [`AuthError::MissingCredentials`].
    async fn credentials_for(&self, host: &str) -> AuthResult<LoginCredentials>;
}

/// Fixed credentials, optionally overridden per host.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    default: Option<LoginCredentials>,
    per_host: HashMap<String, LoginCredentials>,
}

impl StaticCredentials {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials used for any host without an override.
    pub fn with_default(mut self, credentials: LoginCredentials) -> Self {
        self.default = Some(credentials);
        self
    }

    /// Credentials used for one specific host.
    pub fn with_host(mut self, host: &str, credentials: LoginCredentials) -> Self {
        self.per_host.insert(normalize_host(host), credentials);
        self
    }

    /// Whether no credentials are configured at all.
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.per_host.is_empty()
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credentials_for(&self, host: &str) -> AuthResult<LoginCredentials> {
        let key = normalize_host(host);
        self.per_host
            .get(&key)
            .or(self.default.as_ref())
            .cloned()
            .ok_or(AuthError::MissingCredentials(key))
    }
}

/// Credentials read from a JSON secret, cached with the secret's TTL.
///
/// The same account is used for every host.
#[derive(Debug)]
pub struct SecretCredentials {
    secret: CachedSecret,
}

impl SecretCredentials {
    /// Wrap a cached secret holding `{"username","password"}` JSON.
    pub fn new(secret: CachedSecret) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl CredentialSource for SecretCredentials {
    async fn credentials_for(&self, _host: &str) -> AuthResult<LoginCredentials> {
        let raw = self.secret.get().await?;
        match LoginCredentials::from_secret_json(self.secret.name(), &raw) {
            Ok(creds) => Ok(creds),
            Err(e) => {
                // Drop the bad value so a rotated secret is picked up next time
                warn!(secret = %self.secret.name(), error = %e, "Discarding unparseable secret");
                self.secret.invalidate().await;
                Err(e)
            }
        }
    }
}
