//! In-process doubles for the login and fetch contracts.

use crate::service::LibraryService;
use async_trait::async_trait;
use bridge_auth::{
    AuthError, AuthResult, Authenticator, CredentialCache, LoginClient, LoginCredentials,
    SessionCredential, StaticCredentials,
};
use bridge_library::{FetchError, FetchResult, LibraryFetcher, LibraryPayload};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_HOST: &str = "https://speaker.example.com";

/// Issues `token-<n>` for the n-th login, or rejects every login.
#[derive(Default)]
pub struct MockLogin {
    pub calls: AtomicU32,
    pub reject: AtomicBool,
}

#[async_trait]
impl LoginClient for MockLogin {
    async fn login(
        &self,
        host: &str,
        _credentials: &LoginCredentials,
    ) -> AuthResult<SessionCredential> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject.load(Ordering::SeqCst) {
            return Err(AuthError::CredentialsRejected {
                host: host.to_string(),
                message: "Invalid credentials".to_string(),
            });
        }
        Ok(SessionCredential::new(host).with_token(format!("token-{}", n)))
    }
}

/// Outcome of one scripted fetch.
#[derive(Debug, Clone, Copy)]
pub enum FetchStep {
    Payload,
    Unauthorized,
    Timeout,
    Unreachable,
    /// Payload after 200 ms
    Slow,
    /// Never completes on its own
    Hang,
}

/// Plays back scripted outcomes, then serves [`sample_payload`].
#[derive(Default)]
pub struct MockFetcher {
    pub calls: AtomicU32,
    script: Mutex<VecDeque<FetchStep>>,
    tokens: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn scripted(steps: Vec<FetchStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Bearer tokens seen, in call order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl LibraryFetcher for MockFetcher {
    async fn fetch(
        &self,
        host: &str,
        credential: &SessionCredential,
    ) -> FetchResult<LibraryPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .push(credential.token.clone().unwrap_or_default());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FetchStep::Payload);

        match step {
            FetchStep::Payload => Ok(sample_payload()),
            FetchStep::Slow => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(sample_payload())
            }
            FetchStep::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(sample_payload())
            }
            FetchStep::Unauthorized => Err(FetchError::Unauthorized {
                host: host.to_string(),
            }),
            FetchStep::Timeout => Err(FetchError::Timeout {
                host: host.to_string(),
                after_ms: 10,
            }),
            FetchStep::Unreachable => Err(FetchError::Unreachable {
                host: host.to_string(),
                cause: "connection refused".to_string(),
            }),
        }
    }
}

pub fn sample_payload() -> LibraryPayload {
    LibraryPayload::parse(&json!({
        "cards": [
            {
                "id": "c1",
                "title": "Bedtime Stories",
                "author": "Ann",
                "metadata": {"genre": "sleep"}
            },
            {
                "id": "c2",
                "title": "Princess Tales",
                "author": "Bo"
            }
        ],
        "playlists": [
            {"id": "p1", "name": "Favourites", "itemCount": 3}
        ]
    }))
    .unwrap()
}

/// Service over [`TEST_HOST`] with static credentials and the given fetcher.
pub fn service_with(
    fetcher: MockFetcher,
) -> (LibraryService, Arc<MockLogin>, Arc<MockFetcher>) {
    let login = Arc::new(MockLogin::default());
    let fetcher = Arc::new(fetcher);

    let authenticator = Authenticator::new(
        Arc::new(CredentialCache::default()),
        login.clone(),
        Duration::from_secs(1),
    );
    let credentials =
        StaticCredentials::new().with_default(LoginCredentials::new("user@example.com", "pw"));

    let service = LibraryService::new(
        Arc::new(authenticator),
        Arc::new(credentials),
        fetcher.clone(),
        TEST_HOST,
    );
    (service, login, fetcher)
}
