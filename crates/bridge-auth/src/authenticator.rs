//! Host login with session caching
//!
//! [`Authenticator::authenticate`] returns a usable session for a host,
//! touching the network only when neither the cache nor the token store
//! holds a fresh one. The host's login lock is held for the whole
//! login, so concurrent callers for one host share a single login while
//! other hosts proceed independently.

use crate::cache::CredentialCache;
use crate::credentials::LoginCredentials;
use crate::error::{AuthError, AuthResult};
use crate::retry::{with_retry_if, RetryConfig};
use crate::session::{normalize_host, SessionCredential};
use crate::store::{StoredToken, TokenStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Performs the login request against a host.
#[async_trait]
pub trait LoginClient: Send + Sync {
    /// Exchange credentials for a session. Must not touch any cache.
    async fn login(
        &self,
        host: &str,
        credentials: &LoginCredentials,
    ) -> AuthResult<SessionCredential>;
}

/// Cache-aware login driver.
pub struct Authenticator {
    cache: Arc<CredentialCache>,
    login: Arc<dyn LoginClient>,
    store: Option<Arc<dyn TokenStore>>,
    timeout: Duration,
    retry: RetryConfig,
}

impl Authenticator {
    /// Create an authenticator with a per-attempt login deadline.
    pub fn new(cache: Arc<CredentialCache>, login: Arc<dyn LoginClient>, timeout: Duration) -> Self {
        Self {
            cache,
            login,
            store: None,
            timeout,
            retry: RetryConfig::single_retry(),
        }
    }

    /// Persist issued sessions to `store` and rehydrate from it on a cache miss.
    pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the timeout retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Shared credential cache.
    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Attached token store, if any.
    pub fn store(&self) -> Option<&Arc<dyn TokenStore>> {
        self.store.as_ref()
    }

    /// Return a session for `host`, logging in only on a miss.
    #[instrument(skip(self, credentials), fields(host = %normalize_host(host)))]
    pub async fn authenticate(
        &self,
        host: &str,
        credentials: &LoginCredentials,
    ) -> AuthResult<SessionCredential> {
        let key = normalize_host(host);
        let slot = self.cache.slot(&key).await;
        let _login = slot.login.lock().await;

        if let Some(hit) = self.cache.fresh_in(&slot).await {
            debug!(fingerprint = %hit.fingerprint(), "Using cached session");
            return Ok(hit);
        }

        if let Some(restored) = self.rehydrate(&key).await {
            if let Some(hit) = self.cache.restore_in(&slot, restored).await {
                info!(fingerprint = %hit.fingerprint(), "Restored session from token store");
                return Ok(hit);
            }
        }

        let session = self.login_with_deadline(&key, credentials).await?;
        let session = CredentialCache::store_in(&slot, &key, session).await;

        self.persist(&session).await;
        Ok(session)
    }

    /// Log in again regardless of the cache. The old entry survives a failure.
    #[instrument(skip(self, credentials), fields(host = %normalize_host(host)))]
    pub async fn refresh(
        &self,
        host: &str,
        credentials: &LoginCredentials,
    ) -> AuthResult<SessionCredential> {
        let key = normalize_host(host);
        let slot = self.cache.slot(&key).await;
        let _login = slot.login.lock().await;

        let session = self.login_with_deadline(&key, credentials).await?;
        let session = CredentialCache::store_in(&slot, &key, session).await;

        self.persist(&session).await;
        Ok(session)
    }

    /// Forget the session for `host` in the cache and the token store.
    ///
    /// Returns whether a cached entry existed.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, host: &str) -> bool {
        let removed = self.cache.invalidate(host).await;
        if let Some(ref store) = self.store {
            if let Err(e) = store.delete(host).await {
                warn!(error = %e, "Failed to delete persisted token");
            }
        }
        removed
    }

    async fn login_with_deadline(
        &self,
        host: &str,
        credentials: &LoginCredentials,
    ) -> AuthResult<SessionCredential> {
        let started = Instant::now();
        let deadline = self.timeout;

        let result = with_retry_if(
            &self.retry,
            move || async move {
                match tokio::time::timeout(deadline, self.login.login(host, credentials)).await {
                    Ok(result) => result,
                    Err(_) => Err(AuthError::Timeout {
                        host: host.to_string(),
                        after_ms: deadline.as_millis() as u64,
                    }),
                }
            },
            AuthError::is_transient,
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(session) if session.has_secret() => {
                info!(elapsed_ms, fingerprint = %session.fingerprint(), "Login succeeded");
                Ok(session)
            }
            Ok(_) => {
                warn!(elapsed_ms, "Login returned neither token nor cookie");
                Err(AuthError::login_failed(host, "no token or session cookie in response"))
            }
            Err(e) => {
                if e.is_server_error() {
                    error!(elapsed_ms, error = %e, "Login failed");
                } else {
                    warn!(elapsed_ms, error = %e, "Login failed");
                }
                Err(e)
            }
        }
    }

    async fn rehydrate(&self, host: &str) -> Option<SessionCredential> {
        let store = self.store.as_ref()?;
        match store.load(host).await {
            Ok(Some(stored)) if !stored.is_expired() => Some(stored.to_session()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Token store unavailable, logging in instead");
                None
            }
        }
    }

    async fn persist(&self, session: &SessionCredential) {
        let Some(ref store) = self.store else {
            return;
        };
        let expires_at = self
            .cache
            .ttl()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        if let Err(e) = store
            .save(StoredToken::from_session(session, expires_at))
            .await
        {
            warn!(error = %e, "Failed to persist session token");
        }
    }
}
