//! # Bridge Authentication
//!
//! This crate owns everything speaker-bridge knows about being logged in to a
//! target host: the per-host session cache, the login flow, where login
//! credentials come from, and where issued tokens are persisted.
//!
//! ## Overview
//!
//! The bridge-auth crate handles:
//! - **Sessions**: [`SessionCredential`] values (token and/or cookies) scoped to one host
//! - **Caching**: [`CredentialCache`] with a TTL and per-host locking
//! - **Login**: [`Authenticator`] driving a pluggable [`LoginClient`]
//! - **Secrets**: [`CachedSecret`] single-entry TTL cache over a [`SecretSource`]
//! - **Persistence**: [`TokenStore`] implementations for issued tokens
//! - **Refresh**: [`TokenRefresher`] background loop that re-authenticates known hosts
//! - **Retry**: bounded retry helpers used by the login and fetch paths
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bridge_auth::{
//!     AuthResult, Authenticator, CredentialCache, LoginClient, LoginCredentials,
//!     SessionCredential,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct StaticLogin;
//!
//! #[async_trait]
//! impl LoginClient for StaticLogin {
//!     async fn login(
//!         &self,
//!         host: &str,
//!         _credentials: &LoginCredentials,
//!     ) -> AuthResult<SessionCredential> {
//!         Ok(SessionCredential::new(host).with_token("token"))
//!     }
//! }
//!
//! async fn example() -> AuthResult<()> {
//!     let cache = Arc::new(CredentialCache::default());
//!     let auth = Authenticator::new(cache, Arc::new(StaticLogin), Duration::from_secs(30));
//!
//!     let creds = LoginCredentials::new("user@example.com", "secret");
//!     let session = auth.authenticate("https://api.example.com", &creds).await?;
//!     assert!(session.token.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! The cache keeps one slot per host. Logins for the same host are serialized
//! on that slot, so concurrent callers share one network round-trip; hosts
//! never wait on each other.

pub mod authenticator;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod retry;
pub mod secrets;
pub mod session;
pub mod store;

// Re-export main types
pub use authenticator::{Authenticator, LoginClient};
pub use cache::{CredentialCache, DEFAULT_SESSION_TTL};
pub use credentials::{CredentialSource, LoginCredentials, SecretCredentials, StaticCredentials};
pub use error::{AuthError, AuthResult};
pub use refresh::{RefreshHandle, RefreshReport, TokenRefresher, DEFAULT_REFRESH_INTERVAL};
pub use retry::{with_retry_if, RetryConfig};
pub use secrets::{CachedSecret, EnvSecretSource, SecretSource, DEFAULT_SECRET_TTL};
pub use session::{normalize_host, SessionCredential};
pub use store::{FileTokenStore, MemoryTokenStore, StoredToken, TokenStore};
