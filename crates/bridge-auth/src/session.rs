//! Host-scoped session credentials
//!
//! A [`SessionCredential`] is whatever a host handed back from a successful
//! login: a bearer token, a set of cookies, or both. Credentials are only
//! valid for the host that issued them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Number of digest bytes kept in a fingerprint (12 base64 characters).
const FINGERPRINT_BYTES: usize = 9;

/// Normalize a host URL into a cache key.
///
/// Strips whitespace and trailing slashes and lowercases the scheme and
/// authority. Paths are kept as-is.
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, trimmed),
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    match scheme {
        Some(scheme) => format!(
            "{}://{}{}",
            scheme.to_ascii_lowercase(),
            authority.to_ascii_lowercase(),
            path
        ),
        None => format!("{}{}", authority.to_ascii_lowercase(), path),
    }
}

/// Authenticated session for a single host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    /// Normalized host the credential was issued by
    pub host: String,

    /// Bearer token, if the host issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Session cookies as `name=value` pairs
    #[serde(default)]
    pub cookies: Vec<String>,

    /// When the credential was obtained (or last stored)
    pub acquired_at: DateTime<Utc>,
}

impl SessionCredential {
    /// Create an empty credential for a host, acquired now.
    pub fn new(host: &str) -> Self {
        Self {
            host: normalize_host(host),
            token: None,
            cookies: Vec::new(),
            acquired_at: Utc::now(),
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Add a session cookie (`name=value`).
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookies.push(cookie.into());
        self
    }

    /// Whether the credential carries anything a host could authenticate.
    pub fn has_secret(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty()) || !self.cookies.is_empty()
    }

    /// Time elapsed since the credential was acquired.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.acquired_at).to_std().unwrap_or_default()
    }

    /// Check whether the credential is older than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    /// Value for a `Cookie` request header, if any cookies are present.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            None
        } else {
            Some(self.cookies.join("; "))
        }
    }

    /// Short stable identifier for logs. Never log the token itself.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(ref token) = self.token {
            hasher.update(token.as_bytes());
        }
        for cookie in &self.cookies {
            hasher.update(b"\n");
            hasher.update(cookie.as_bytes());
        }
        let digest = hasher.finalize();
        base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            &digest[..FINGERPRINT_BYTES],
        )
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("cookies", &self.cookies.len())
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host(" https://Api.Example.com/ "),
            "https://api.example.com"
        );
        assert_eq!(
            normalize_host("HTTP://Example.com:8080/Base/"),
            "http://example.com:8080/Base"
        );
        assert_eq!(normalize_host("Example.com"), "example.com");
    }

    #[test]
    fn test_credential_builders() {
        let cred = SessionCredential::new("https://Example.com/")
            .with_token("abc")
            .with_cookie("sid=1")
            .with_cookie("csrf=2");

        assert_eq!(cred.host, "https://example.com");
        assert!(cred.has_secret());
        assert_eq!(cred.cookie_header().as_deref(), Some("sid=1; csrf=2"));
        assert!(SessionCredential::new("h").cookie_header().is_none());
        assert!(!SessionCredential::new("h").has_secret());
    }

    #[test]
    fn test_expiry() {
        let mut cred = SessionCredential::new("https://example.com");
        assert!(!cred.is_expired(Duration::from_secs(300)));

        cred.acquired_at = Utc::now() - chrono::Duration::minutes(6);
        assert!(cred.is_expired(Duration::from_secs(300)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = SessionCredential::new("https://example.com").with_token("super-secret");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = SessionCredential::new("h").with_token("t1");
        let b = SessionCredential::new("h").with_token("t1");
        let c = SessionCredential::new("h").with_token("t2");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }
}
