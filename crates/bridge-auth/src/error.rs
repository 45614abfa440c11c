//! Error types for authentication operations
//!
//! This module defines the errors raised while logging in to a host,
//! resolving login credentials, and persisting issued tokens.

use thiserror::Error;

/// Authentication error types.
///
/// Every host-scoped variant carries the host it failed against so the
/// caller can tell independent hosts apart in its user-facing message.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Login request could not be completed (network error, bad status, bad body)
    #[error("Authentication with {host} failed: {cause}")]
    LoginFailed {
        /// Host the login was attempted against
        host: String,
        /// Underlying cause
        cause: String,
    },

    /// Host rejected the supplied username/password
    #[error("Credentials rejected by {host}: {message}")]
    CredentialsRejected {
        /// Host that rejected the login
        host: String,
        /// Message returned by the host
        message: String,
    },

    /// Login did not finish before its deadline
    #[error("Authentication with {host} timed out after {after_ms}ms")]
    Timeout {
        /// Host the login was attempted against
        host: String,
        /// Deadline that elapsed, in milliseconds
        after_ms: u64,
    },

    /// A request made with a cached session was refused
    #[error("Session for {host} is no longer authorized")]
    Unauthorized {
        /// Host that refused the session
        host: String,
    },

    /// No login credentials are configured for the host
    #[error("No credentials configured for {0}")]
    MissingCredentials(String),

    /// Secret could not be read from its source
    #[error("Secret unavailable: {0}")]
    SecretUnavailable(String),

    /// Secret was read but its content is not usable
    #[error("Invalid secret content: {0}")]
    InvalidSecret(String),

    /// Token store read/write failed
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Build a [`AuthError::LoginFailed`] from any displayable cause.
    pub fn login_failed(host: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        AuthError::LoginFailed {
            host: host.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether a single automatic retry is allowed for this error.
    ///
    /// Only deadline overruns qualify; rejected credentials and transport
    /// failures are surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Timeout { .. })
    }

    /// Check if this error should be logged at error level.
    ///
    /// Rejected credentials are expected user errors and are not.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::Internal(_) | AuthError::Config(_) | AuthError::Storage(_)
        )
    }

    /// Host this error is scoped to, if any.
    pub fn host(&self) -> Option<&str> {
        match self {
            AuthError::LoginFailed { host, .. }
            | AuthError::CredentialsRejected { host, .. }
            | AuthError::Timeout { host, .. }
            | AuthError::Unauthorized { host }
            | AuthError::MissingCredentials(host) => Some(host.as_str()),
            _ => None,
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::CredentialsRejected { .. }
            | AuthError::Unauthorized { .. }
            | AuthError::MissingCredentials(_) => 401,

            AuthError::LoginFailed { .. } => 502,
            AuthError::Timeout { .. } => 504,

            AuthError::SecretUnavailable(_)
            | AuthError::InvalidSecret(_)
            | AuthError::Storage(_)
            | AuthError::Config(_)
            | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::LoginFailed { .. } => "LOGIN_FAILED",
            AuthError::CredentialsRejected { .. } => "CREDENTIALS_REJECTED",
            AuthError::Timeout { .. } => "TIMEOUT",
            AuthError::Unauthorized { .. } => "UNAUTHORIZED",
            AuthError::MissingCredentials(_) => "MISSING_CREDENTIALS",
            AuthError::SecretUnavailable(_) => "SECRET_UNAVAILABLE",
            AuthError::InvalidSecret(_) => "INVALID_SECRET",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::Config(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_are_transient() {
        let timeout = AuthError::Timeout {
            host: "https://a.example".to_string(),
            after_ms: 100,
        };
        assert!(timeout.is_transient());

        let rejected = AuthError::CredentialsRejected {
            host: "https://a.example".to_string(),
            message: "bad password".to_string(),
        };
        assert!(!rejected.is_transient());
        assert_eq!(rejected.status_code(), 401);
        assert_eq!(rejected.error_code(), "CREDENTIALS_REJECTED");
    }

    #[test]
    fn test_error_carries_host() {
        let err = AuthError::login_failed("https://a.example", "connection refused");
        assert_eq!(err.host(), Some("https://a.example"));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(AuthError::Config("x".into()).host(), None);
    }
}
