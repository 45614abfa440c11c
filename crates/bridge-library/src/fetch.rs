//! Library fetch contract
//!
//! [`LibraryFetcher`] is implemented by transport clients. Every error
//! carries the host it was raised for.

use crate::model::LibraryPayload;
use async_trait::async_trait;
use bridge_auth::SessionCredential;
use thiserror::Error;

/// Library fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Host refused the session (401/403)
    #[error("Not authenticated with {host}")]
    Unauthorized {
        /// Host that refused the request
        host: String,
    },

    /// Any other non-success status
    #[error("Library request to {host} failed with HTTP {status}: {message}")]
    Http {
        /// Host the request went to
        host: String,
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Response was not a usable library payload
    #[error("Malformed library payload from {host}: {cause}")]
    Malformed {
        /// Host the payload came from
        host: String,
        /// What was wrong with it
        cause: String,
    },

    /// Transport failure before a response arrived
    #[error("Library service unreachable at {host}: {cause}")]
    Unreachable {
        /// Host that could not be reached
        host: String,
        /// Underlying cause
        cause: String,
    },

    /// Fetch did not finish before its deadline
    #[error("Library request to {host} timed out after {after_ms}ms")]
    Timeout {
        /// Host the request went to
        host: String,
        /// Deadline that elapsed, in milliseconds
        after_ms: u64,
    },
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    /// Whether the session should be invalidated and re-established.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized { .. })
    }

    /// Whether a single automatic retry is allowed.
    ///
    /// Only an elapsed deadline qualifies; a refused or failed connection
    /// is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    /// Host the error was raised for.
    pub fn host(&self) -> &str {
        match self {
            FetchError::Unauthorized { host }
            | FetchError::Http { host, .. }
            | FetchError::Malformed { host, .. }
            | FetchError::Unreachable { host, .. }
            | FetchError::Timeout { host, .. } => host,
        }
    }

    /// HTTP status to report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Unauthorized { .. } => 401,
            FetchError::Http { .. } | FetchError::Malformed { .. } | FetchError::Unreachable { .. } => 502,
            FetchError::Timeout { .. } => 504,
        }
    }

    /// Error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Unauthorized { .. } => "UNAUTHORIZED",
            FetchError::Http { .. } => "UPSTREAM_ERROR",
            FetchError::Malformed { .. } => "MALFORMED_PAYLOAD",
            FetchError::Unreachable { .. } => "UNREACHABLE",
            FetchError::Timeout { .. } => "TIMEOUT",
        }
    }
}

/// Retrieves the library of an authenticated host.
#[async_trait]
pub trait LibraryFetcher: Send + Sync {
    /// Fetch the current library snapshot using `credential`.
    async fn fetch(
        &self,
        host: &str,
        credential: &SessionCredential,
    ) -> FetchResult<LibraryPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let unauthorized = FetchError::Unauthorized {
            host: "https://a.example".into(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_transient());
        assert_eq!(unauthorized.status_code(), 401);

        let timeout = FetchError::Timeout {
            host: "https://a.example".into(),
            after_ms: 10,
        };
        assert!(timeout.is_transient());
        assert_eq!(timeout.status_code(), 504);
        assert_eq!(timeout.host(), "https://a.example");
    }

    #[test]
    fn test_messages_name_host() {
        let err = FetchError::Unreachable {
            host: "https://b.example".into(),
            cause: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Library service unreachable at https://b.example: connection refused"
        );
        assert_eq!(err.error_code(), "UNREACHABLE");
        assert!(!err.is_transient());
    }
}
