//! Persistence for issued session tokens
//!
//! A [`TokenStore`] keeps the last credential issued by each host so a
//! restarted process can reuse it instead of logging in again.

use crate::error::{AuthError, AuthResult};
use crate::session::{normalize_host, SessionCredential};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

/// A persisted session credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Normalized host
    pub host: String,

    /// Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Session cookies
    #[serde(default)]
    pub cookies: Vec<String>,

    /// When the token was last written
    pub updated_at: DateTime<Utc>,

    /// When the token stops being usable, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Capture a session credential for persistence.
    pub fn from_session(session: &SessionCredential, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            host: normalize_host(&session.host),
            token: session.token.clone(),
            cookies: session.cookies.clone(),
            updated_at: session.acquired_at,
            expires_at,
        }
    }

    /// Rebuild the session credential, keeping the original acquisition time.
    pub fn to_session(&self) -> SessionCredential {
        SessionCredential {
            host: self.host.clone(),
            token: self.token.clone(),
            cookies: self.cookies.clone(),
            acquired_at: self.updated_at,
        }
    }

    /// Whether the token is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("host", &self.host)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("cookies", &self.cookies.len())
            .field("updated_at", &self.updated_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Storage backend for persisted tokens, keyed by normalized host.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the token stored for `host`.
    async fn load(&self, host: &str) -> AuthResult<Option<StoredToken>>;

    /// Insert or replace the token for `token.host`.
    async fn save(&self, token: StoredToken) -> AuthResult<()>;

    /// Remove the token for `host`. Returns whether one existed.
    async fn delete(&self, host: &str) -> AuthResult<bool>;

    /// Hosts with a stored token, sorted.
    async fn hosts(&self) -> AuthResult<Vec<String>>;
}

/// In-process token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, StoredToken>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, host: &str) -> AuthResult<Option<StoredToken>> {
        Ok(self.tokens.read().await.get(&normalize_host(host)).cloned())
    }

    async fn save(&self, mut token: StoredToken) -> AuthResult<()> {
        token.host = normalize_host(&token.host);
        self.tokens.write().await.insert(token.host.clone(), token);
        Ok(())
    }

    async fn delete(&self, host: &str) -> AuthResult<bool> {
        Ok(self
            .tokens
            .write()
            .await
            .remove(&normalize_host(host))
            .is_some())
    }

    async fn hosts(&self) -> AuthResult<Vec<String>> {
        let mut hosts: Vec<String> = self.tokens.read().await.keys().cloned().collect();
        hosts.sort();
        Ok(hosts)
    }
}

/// Token store backed by a single JSON file.
///
/// The file holds a map of host to token. Writes go to a sibling temp file
/// which is then renamed over the original, so readers never see a torn file.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

type TokenMap = BTreeMap<String, StoredToken>;

impl FileTokenStore {
    /// Use the JSON file at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> AuthResult<TokenMap> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TokenMap::new()),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(TokenMap::new());
        }
        serde_json::from_slice(&raw)
            .map_err(|e| AuthError::Storage(format!("parse {}: {}", self.path.display(), e)))
    }

    async fn write_map(&self, map: &TokenMap) -> AuthResult<()> {
        let body = serde_json::to_vec_pretty(map)
            .map_err(|e| AuthError::Storage(format!("encode tokens: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| AuthError::Storage(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AuthError::Storage(format!("rename {}: {}", tmp.display(), e)))?;

        debug!(path = %self.path.display(), entries = map.len(), "Token store written");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, host: &str) -> AuthResult<Option<StoredToken>> {
        let map = self.read_map().await?;
        Ok(map.get(&normalize_host(host)).cloned())
    }

    #[instrument(skip(self, token), fields(host = %token.host))]
    async fn save(&self, mut token: StoredToken) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        token.host = normalize_host(&token.host);
        map.insert(token.host.clone(), token);
        self.write_map(&map).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, host: &str) -> AuthResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        let removed = map.remove(&normalize_host(host)).is_some();
        if removed {
            self.write_map(&map).await?;
        }
        Ok(removed)
    }

    async fn hosts(&self) -> AuthResult<Vec<String>> {
        Ok(self.read_map().await?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(host: &str, value: &str) -> StoredToken {
        StoredToken::from_session(&SessionCredential::new(host).with_token(value), None)
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "bridge-auth-{}-{}/tokens.json",
            std::process::id(),
            name
        ))
    }

    #[test]
    fn test_expiry() {
        let mut t = token("https://a.example", "x");
        assert!(!t.is_expired());

        t.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(t.is_expired());

        t.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(!t.is_expired());
    }

    #[test]
    fn test_session_conversion_keeps_timestamp() {
        let mut session = SessionCredential::new("https://a.example")
            .with_token("t")
            .with_cookie("sid=1");
        session.acquired_at = Utc::now() - chrono::Duration::minutes(3);

        let stored = StoredToken::from_session(&session, None);
        assert_eq!(stored.to_session(), session);
        assert!(!format!("{:?}", stored).contains("\"t\""));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTokenStore::new();
        store.save(token("https://B.example/", "b")).await.unwrap();
        store.save(token("https://a.example", "a")).await.unwrap();

        let b = store.load("https://b.example").await.unwrap().unwrap();
        assert_eq!(b.token.as_deref(), Some("b"));
        assert_eq!(
            store.hosts().await.unwrap(),
            vec!["https://a.example", "https://b.example"]
        );

        assert!(store.delete("https://a.example").await.unwrap());
        assert!(!store.delete("https://a.example").await.unwrap());
        assert!(store.load("https://a.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let path = temp_path("persist");
        let _ = tokio::fs::remove_file(&path).await;

        let store = FileTokenStore::new(&path);
        assert!(store.load("https://a.example").await.unwrap().is_none());
        store.save(token("https://a.example", "a")).await.unwrap();
        store.save(token("https://b.example", "b")).await.unwrap();

        let reopened = FileTokenStore::new(&path);
        let a = reopened.load("https://a.example").await.unwrap().unwrap();
        assert_eq!(a.token.as_deref(), Some("a"));
        assert_eq!(reopened.hosts().await.unwrap().len(), 2);

        assert!(reopened.delete("https://a.example").await.unwrap());
        assert_eq!(
            store.hosts().await.unwrap(),
            vec!["https://b.example".to_string()]
        );

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let path = temp_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileTokenStore::new(&path);
        assert!(matches!(
            store.load("https://a.example").await,
            Err(AuthError::Storage(_))
        ));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
