//! Secret lookup with a TTL cache.
//!
//! Login credentials can live outside the process configuration, in a
//! secret manager. [`SecretSource`] is that seam; [`CachedSecret`] keeps
//! the most recent value of one secret for a bounded time so that every
//! login does not turn into a secret-manager round-trip.

use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Default lifetime of a cached secret value (5 minutes).
pub const DEFAULT_SECRET_TTL: Duration = Duration::from_secs(300);

/// A place secrets can be read from.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Read the current value of the named secret.
    async fn fetch_secret(&self, name: &str) -> AuthResult<String>;
}

/// Secret source backed by environment variables.
///
/// The secret name is uppercased and `-`, `/` and `.` become `_`, so
/// `bridge/credentials` resolves to `BRIDGE_CREDENTIALS`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretSource {
    /// Optional prefix prepended to every variable name
    prefix: Option<String>,
}

impl EnvSecretSource {
    /// Create a source without a prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that prepends `prefix` to every variable name.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Environment variable a secret name resolves to.
    pub fn var_name(&self, name: &str) -> String {
        let sanitized: String = name
            .chars()
            .map(|c| match c {
                '-' | '/' | '.' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match self.prefix {
            Some(ref prefix) => format!("{}{}", prefix, sanitized),
            None => sanitized,
        }
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn fetch_secret(&self, name: &str) -> AuthResult<String> {
        let var = self.var_name(name);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(AuthError::SecretUnavailable(name.to_string())),
        }
    }
}

/// Single-entry TTL cache for one named secret.
pub struct CachedSecret {
    source: Arc<dyn SecretSource>,
    name: String,
    ttl: Duration,
    entry: Mutex<Option<(String, Instant)>>,
}

impl std::fmt::Debug for CachedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSecret")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl CachedSecret {
    /// Cache `name` from `source` for `ttl`.
    pub fn new(source: Arc<dyn SecretSource>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            source,
            name: name.into(),
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Secret name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, served from cache while younger than the TTL.
    ///
    /// Concurrent callers on a miss share one fetch. A failed fetch leaves
    /// the cache empty.
    #[instrument(skip(self), fields(secret = %self.name))]
    pub async fn get(&self) -> AuthResult<String> {
        let mut entry = self.entry.lock().await;
        if let Some((ref value, fetched_at)) = *entry {
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
            debug!("Cached secret expired");
        }

        *entry = None;
        let value = self.source.fetch_secret(&self.name).await?;
        *entry = Some((value.clone(), Instant::now()));
        debug!("Secret refreshed from source");
        Ok(value)
    }

    /// Drop the cached value so the next `get` reads the source.
    pub async fn invalidate(&self) {
        self.entry.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SecretSource for CountingSource {
        async fn fetch_secret(&self, name: &str) -> AuthResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-v{}", name, n))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SecretSource for FailingSource {
        async fn fetch_secret(&self, name: &str) -> AuthResult<String> {
            Err(AuthError::SecretUnavailable(name.to_string()))
        }
    }

    #[test]
    fn test_env_var_name() {
        let source = EnvSecretSource::new();
        assert_eq!(source.var_name("bridge/credentials"), "BRIDGE_CREDENTIALS");
        assert_eq!(source.var_name("a-b.c"), "A_B_C");

        let prefixed = EnvSecretSource::with_prefix("SECRET_");
        assert_eq!(prefixed.var_name("login"), "SECRET_LOGIN");
    }

    #[tokio::test]
    async fn test_env_source_missing_var() {
        let source = EnvSecretSource::with_prefix("BRIDGE_AUTH_TEST_UNSET_");
        let result = source.fetch_secret("nothing-here").await;
        assert!(matches!(result, Err(AuthError::SecretUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cached_within_ttl() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
        });
        let secret = CachedSecret::new(source.clone(), "creds", Duration::from_secs(60));

        assert_eq!(secret.get().await.unwrap(), "creds-v1");
        assert_eq!(secret.get().await.unwrap(), "creds-v1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetched_after_ttl() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
        });
        let secret = CachedSecret::new(source.clone(), "creds", Duration::from_millis(30));

        assert_eq!(secret.get().await.unwrap(), "creds-v1");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(secret.get().await.unwrap(), "creds-v2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
        });
        let secret = CachedSecret::new(source.clone(), "creds", Duration::from_secs(60));

        secret.get().await.unwrap();
        secret.invalidate().await;
        assert_eq!(secret.get().await.unwrap(), "creds-v2");
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let secret = CachedSecret::new(Arc::new(FailingSource), "creds", DEFAULT_SECRET_TTL);
        assert!(secret.get().await.is_err());
        assert!(secret.entry.lock().await.is_none());
        assert!(!format!("{:?}", secret).contains("creds-v"));
    }
}
