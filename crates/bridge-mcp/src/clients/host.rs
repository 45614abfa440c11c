//! Speaker host client.
//!
//! HTTP client for a speaker host. Implements the login flow used
//! by the [`Authenticator`](bridge_auth::Authenticator) and the library
//! fetch used by the library service.

use super::config::endpoint_url;
use async_trait::async_trait;
use bridge_auth::{normalize_host, AuthError, AuthResult, LoginClient, LoginCredentials, SessionCredential};
use bridge_library::{FetchError, FetchResult, LibraryFetcher, LibraryPayload};
use reqwest::header::{ACCEPT, AUTHORIZATION, COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Login path, relative to the host.
pub const LOGIN_PATH: &str = "user/login";

/// Primary library path.
pub const LIBRARY_PATH: &str = "library";

/// Library path tried when the primary one returns 404.
pub const LIBRARY_FALLBACK_PATH: &str = "api/library";

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// HTTP client for speaker hosts.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct HostClient {
    /// HTTP client instance.
    client: Client,

    /// Request timeout.
    timeout: Duration,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

impl HostClient {
    /// Create a new host client.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("speaker-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn authorized(&self, request: RequestBuilder, credential: &SessionCredential) -> RequestBuilder {
        let mut request = request.header(ACCEPT, "application/json");
        if let Some(token) = credential.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(cookies) = credential.cookie_header() {
            request = request.header(COOKIE, cookies);
        }
        request
    }

    async fn get_library(
        &self,
        host: &str,
        path: &str,
        credential: &SessionCredential,
    ) -> FetchResult<Response> {
        let url = endpoint_url(host, path);
        debug!(url = %url, "Requesting library");

        self.authorized(self.client.get(&url), credential)
            .send()
            .await
            .map_err(|e| self.transport_error(host, e))
    }

    fn transport_error(&self, host: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                host: host.to_string(),
                after_ms: self.timeout_ms(),
            }
        } else {
            FetchError::Unreachable {
                host: host.to_string(),
                cause: error.to_string(),
            }
        }
    }

    /// Map a library response to a payload.
    async fn handle_library_response(
        &self,
        host: &str,
        response: Response,
    ) -> FetchResult<LibraryPayload> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "Host refused the session");
            return Err(FetchError::Unauthorized {
                host: host.to_string(),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .map(|body| truncate(&body))
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Library API error ({}): {}", status.as_u16(), message);
            return Err(FetchError::Http {
                host: host.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(host, e))?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed {
            host: host.to_string(),
            cause: e.to_string(),
        })?;

        LibraryPayload::parse(unwrap_envelope(&body)).map_err(|e| FetchError::Malformed {
            host: host.to_string(),
            cause: e.to_string(),
        })
    }
}

#[async_trait]
impl LoginClient for HostClient {
    #[instrument(skip(self, credentials), fields(host = %host))]
    async fn login(
        &self,
        host: &str,
        credentials: &LoginCredentials,
    ) -> AuthResult<SessionCredential> {
        let url = endpoint_url(host, LOGIN_PATH);
        debug!(url = %url, "Logging in");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&LoginBody {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout {
                        host: host.to_string(),
                        after_ms: self.timeout_ms(),
                    }
                } else {
                    AuthError::login_failed(host, e)
                }
            })?;

        let status = response.status();
        let cookies = session_cookies(&response);
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::login_failed(host, e))?;
        let body: Option<Value> = serde_json::from_str(&text).ok();
        let explicit_failure = body
            .as_ref()
            .and_then(|b| b.get("success"))
            .and_then(Value::as_bool)
            == Some(false);

        debug!(status = status.as_u16(), cookies = cookies.len(), "Login response");

        if !status.is_success() || explicit_failure {
            let message = body
                .as_ref()
                .and_then(|b| b.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("login refused")
                        .to_string()
                });

            let rejected = explicit_failure
                || status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN;
            return Err(if rejected {
                AuthError::CredentialsRejected {
                    host: host.to_string(),
                    message,
                }
            } else {
                AuthError::login_failed(host, format!("HTTP {}: {}", status.as_u16(), message))
            });
        }

        let mut session = SessionCredential::new(host);
        if let Some(token) = body.as_ref().and_then(login_token) {
            session = session.with_token(token);
        }
        for cookie in cookies {
            session = session.with_cookie(cookie);
        }
        Ok(session)
    }
}

#[async_trait]
impl LibraryFetcher for HostClient {
    #[instrument(skip(self, credential), fields(host = %host))]
    async fn fetch(
        &self,
        host: &str,
        credential: &SessionCredential,
    ) -> FetchResult<LibraryPayload> {
        let host = normalize_host(host);
        let mut response = self.get_library(&host, LIBRARY_PATH, credential).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Primary library path missing, trying fallback");
            response = self
                .get_library(&host, LIBRARY_FALLBACK_PATH, credential)
                .await?;
        }

        let payload = self.handle_library_response(&host, response).await?;
        debug!(
            cards = payload.card_count(),
            playlists = payload.playlist_count(),
            "Fetched library"
        );
        Ok(payload)
    }
}

/// `name=value` pairs from every `Set-Cookie` header.
fn session_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .map(str::to_string)
        .collect()
}

/// Token from a login body, checked in the order hosts are known to use.
fn login_token(body: &Value) -> Option<String> {
    fn non_empty(value: &Value) -> Option<&str> {
        value.as_str().filter(|token| !token.is_empty())
    }

    ["token", "accessToken", "access_token"]
        .iter()
        .find_map(|key| body.get(*key).and_then(non_empty))
        .or_else(|| {
            body.get("data")
                .and_then(|data| data.get("token"))
                .and_then(non_empty)
        })
        .map(str::to_string)
}

/// Some hosts wrap the library in `{"data": {...}}`.
fn unwrap_envelope(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if data.is_object() && body.get("cards").is_none() && body.get("playlists").is_none() => {
            data
        }
        _ => body,
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
