//! Library service
//!
//! [`LibraryService`] is the single entry point the tools and the REST API
//! use. It resolves the target host, obtains a session through the
//! [`Authenticator`], fetches the library and answers queries about it.
//!
//! A library request that the host refuses with 401/403 invalidates the
//! session, logs in once more and retries once before the error is
//! surfaced.
//!
//! Cached payloads are tied to the session that fetched them and are only
//! served while that session is still the host's cached one.

use crate::clients::config::{is_http_url, BridgeConfig, ConfigError};
use crate::clients::HostClient;
use bridge_auth::{
    normalize_host, with_retry_if, AuthError, AuthResult, Authenticator, CredentialCache,
    CredentialSource, FileTokenStore, MemoryTokenStore, RetryConfig, SessionCredential,
    TokenStore,
};
use bridge_library::{FetchError, LibraryFetcher, LibraryPayload, QueryDispatcher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Library service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Authentication failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Library fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Host is not a usable URL, or not allowed
    #[error("Unknown host: {0}")]
    UnknownHost(String),
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Auth(e) => e.status_code(),
            ServiceError::Fetch(e) => e.status_code(),
            ServiceError::UnknownHost(_) => 404,
        }
    }

    /// Error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Auth(e) => e.error_code(),
            ServiceError::Fetch(e) => e.error_code(),
            ServiceError::UnknownHost(_) => "UNKNOWN_HOST",
        }
    }

    /// Message suitable for a tool result.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Auth(e) => match e.host() {
                Some(host) => format!("Not authenticated with {}: {}", host, e),
                None => format!("Not authenticated: {}", e),
            },
            ServiceError::Fetch(e @ FetchError::Timeout { .. }) => {
                format!("Library service unreachable: {}", e)
            }
            ServiceError::Fetch(e) => e.to_string(),
            ServiceError::UnknownHost(_) => self.to_string(),
        }
    }
}

/// Default deadline for one library fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

struct CachedPayload {
    payload: LibraryPayload,
    fetched_at: Instant,
    /// Fingerprint of the session used for the fetch
    session: String,
}

/// Authenticated library access for one or more hosts.
pub struct LibraryService {
    authenticator: Arc<Authenticator>,
    credentials: Arc<dyn CredentialSource>,
    fetcher: Arc<dyn LibraryFetcher>,
    dispatcher: QueryDispatcher,
    default_host: String,
    known_hosts: Vec<String>,
    strict_hosts: bool,
    fetch_retry: RetryConfig,
    fetch_timeout: Duration,
    payload_ttl: Option<Duration>,
    payloads: RwLock<HashMap<String, CachedPayload>>,
}

impl LibraryService {
    /// Create a service with the standard query rules and no payload cache.
    pub fn new(
        authenticator: Arc<Authenticator>,
        credentials: Arc<dyn CredentialSource>,
        fetcher: Arc<dyn LibraryFetcher>,
        default_host: &str,
    ) -> Self {
        let default_host = normalize_host(default_host);
        Self {
            authenticator,
            credentials,
            fetcher,
            dispatcher: QueryDispatcher::default(),
            known_hosts: vec![default_host.clone()],
            default_host,
            strict_hosts: false,
            fetch_retry: RetryConfig::single_retry(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            payload_ttl: None,
            payloads: RwLock::new(HashMap::new()),
        }
    }

    /// Build the production wiring described by `config`.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        let client = Arc::new(HostClient::new(config.timeout())?);
        let cache = Arc::new(CredentialCache::new(config.session_ttl()));
        let store: Arc<dyn TokenStore> = match config.token_store {
            Some(ref path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let authenticator =
            Authenticator::new(cache, client.clone(), config.timeout()).with_store(store);

        Ok(Self::new(
            Arc::new(authenticator),
            config.credential_source(),
            client,
            &config.default_host,
        )
        .with_known_hosts(config.hosts.clone(), config.strict_hosts)
        .with_fetch_timeout(config.timeout())
        .with_payload_ttl(config.library_cache_ttl()))
    }

    /// Add known hosts; with `strict`, only known hosts are served.
    pub fn with_known_hosts(mut self, hosts: Vec<String>, strict: bool) -> Self {
        for host in hosts {
            let host = normalize_host(&host);
            if !self.known_hosts.contains(&host) {
                self.known_hosts.push(host);
            }
        }
        self.strict_hosts = strict;
        self
    }

    /// Keep fetched payloads per host for `ttl`.
    pub fn with_payload_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.payload_ttl = ttl;
        self
    }

    /// Replace the query dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: QueryDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Override the fetch timeout retry policy.
    pub fn with_fetch_retry(mut self, retry: RetryConfig) -> Self {
        self.fetch_retry = retry;
        self
    }

    /// Deadline for one fetch attempt, including any fallback path.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Normalized default host.
    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    /// Default host followed by the other known hosts.
    pub fn known_hosts(&self) -> &[String] {
        &self.known_hosts
    }

    /// Shared authenticator.
    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    /// Login credential source.
    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    /// Query dispatcher.
    pub fn dispatcher(&self) -> &QueryDispatcher {
        &self.dispatcher
    }

    /// Resolve an optional host argument to a normalized host key.
    pub fn resolve_host(&self, host: Option<&str>) -> ServiceResult<String> {
        let raw = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(&self.default_host);

        if !is_http_url(raw) {
            return Err(ServiceError::UnknownHost(raw.to_string()));
        }

        let key = normalize_host(raw);
        if self.strict_hosts && !self.known_hosts.contains(&key) {
            return Err(ServiceError::UnknownHost(key));
        }
        Ok(key)
    }

    /// Obtain a session for `host`, reusing the cache when possible.
    #[instrument(skip(self))]
    pub async fn authenticate_host(&self, host: Option<&str>) -> ServiceResult<SessionCredential> {
        let host = self.resolve_host(host)?;
        self.session_for(&host).await
    }

    /// Fetch the library of `host`.
    #[instrument(skip(self))]
    pub async fn get_library_data(&self, host: Option<&str>) -> ServiceResult<LibraryPayload> {
        let host = self.resolve_host(host)?;

        if let Some(payload) = self.cached_payload(&host).await {
            debug!(host = %host, "Using cached library payload");
            return Ok(payload);
        }

        let mut session = self.session_for(&host).await?;
        let payload = match self.fetch_once_retried(&host, &session).await {
            Err(e) if e.is_unauthorized() => {
                info!(host = %host, "Session refused, re-authenticating");
                self.drop_session(&host).await;

                session = self.session_for(&host).await?;
                match self.fetch_once_retried(&host, &session).await {
                    Err(e) if e.is_unauthorized() => {
                        warn!(host = %host, "Fresh session refused as well");
                        self.drop_session(&host).await;
                        return Err(e.into());
                    }
                    other => other?,
                }
            }
            other => other?,
        };

        self.remember_payload(&host, &session, &payload).await;
        Ok(payload)
    }

    /// Answer `query` against an already fetched payload.
    pub fn search_library(&self, payload: &LibraryPayload, query: &str) -> String {
        self.dispatcher.answer(payload, query)
    }

    /// Fetch the library of `host` and answer `query` against it.
    #[instrument(skip(self))]
    pub async fn query_library(&self, host: Option<&str>, query: &str) -> ServiceResult<String> {
        let payload = self.get_library_data(host).await?;
        Ok(self.search_library(&payload, query))
    }

    /// Forget the session and cached payload of `host`.
    ///
    /// Returns whether a cached session existed.
    #[instrument(skip(self))]
    pub async fn logout(&self, host: Option<&str>) -> ServiceResult<bool> {
        let host = self.resolve_host(host)?;
        self.payloads.write().await.remove(&host);
        Ok(self.authenticator.invalidate(&host).await)
    }

    async fn session_for(&self, host: &str) -> ServiceResult<SessionCredential> {
        match self.login_session(host).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.payloads.write().await.remove(host);
                Err(e.into())
            }
        }
    }

    async fn login_session(&self, host: &str) -> AuthResult<SessionCredential> {
        let credentials = self.credentials.credentials_for(host).await?;
        self.authenticator.authenticate(host, &credentials).await
    }

    async fn fetch_once_retried(
        &self,
        host: &str,
        session: &SessionCredential,
    ) -> Result<LibraryPayload, FetchError> {
        let deadline = self.fetch_timeout;
        with_retry_if(
            &self.fetch_retry,
            move || async move {
                match tokio::time::timeout(deadline, self.fetcher.fetch(host, session)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        host: host.to_string(),
                        after_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    }),
                }
            },
            FetchError::is_transient,
        )
        .await
    }

    async fn drop_session(&self, host: &str) {
        self.payloads.write().await.remove(host);
        self.authenticator.invalidate(host).await;
    }

    /// Fingerprint of the host's cached session, if it has a fresh one.
    async fn live_session(&self, host: &str) -> Option<String> {
        self.authenticator
            .cache()
            .get(host)
            .await
            .map(|session| session.fingerprint())
    }

    async fn cached_payload(&self, host: &str) -> Option<LibraryPayload> {
        let ttl = self.payload_ttl?;
        let session = self.live_session(host).await?;
        let payloads = self.payloads.read().await;
        payloads
            .get(host)
            .filter(|cached| cached.fetched_at.elapsed() < ttl && cached.session == session)
            .map(|cached| cached.payload.clone())
    }

    async fn remember_payload(
        &self,
        host: &str,
        session: &SessionCredential,
        payload: &LibraryPayload,
    ) {
        if self.payload_ttl.is_none() {
            return;
        }
        let session = session.fingerprint();
        if self.live_session(host).await.as_ref() != Some(&session) {
            debug!(host = %host, "Session changed during fetch, not caching payload");
            return;
        }
        self.payloads.write().await.insert(
            host.to_string(),
            CachedPayload {
                payload: payload.clone(),
                fetched_at: Instant::now(),
                session,
            },
        );
    }
}
