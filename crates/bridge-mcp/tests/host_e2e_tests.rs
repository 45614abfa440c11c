//! End-to-end tests for host login and library access.
//!
//! A wiremock server stands in for a speaker host. The service is built
//! from a [`BridgeConfig`] exactly as the binary builds it, so these tests
//! cover the reqwest client, the authenticator, and the library service
//! together.

use bridge_auth::{AuthError, LoginClient, LoginCredentials};
use bridge_library::FetchError;
use bridge_mcp::clients::{BridgeConfig, HostClient};
use bridge_mcp::tools::all_tools;
use bridge_mcp::{LibraryService, McpRequest, McpServer, ServiceError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test fixture providing a mock host and a config pointing at it.
struct TestFixture {
    /// Mock speaker host.
    host: MockServer,
    /// Bridge configuration for the mock host.
    config: BridgeConfig,
}

impl TestFixture {
    /// Create a new fixture with a mock host.
    async fn new() -> Self {
        let host = MockServer::start().await;
        let config = BridgeConfig {
            default_host: host.uri(),
            username: Some("parent@example.com".to_string()),
            password: Some("hunter2".to_string()),
            timeout_secs: 5,
            refresh_interval_secs: 0,
            ..BridgeConfig::default()
        };
        Self { host, config }
    }

    /// Build a service for the fixture's config.
    fn service(&self) -> LibraryService {
        LibraryService::from_config(&self.config).expect("Should build service")
    }

    /// Mount a login endpoint issuing `token`.
    async fn mount_login(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path("/user/login"))
            .and(body_json(json!({
                "username": "parent@example.com",
                "password": "hunter2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": token
            })))
            .expect(1)
            .mount(&self.host)
            .await;
    }
}

fn library_body() -> serde_json::Value {
    json!({
        "cards": [
            {"id": "c1", "title": "Princess Tales", "author": "Ann", "metadata": {"age": "4+"}},
            {"id": "c2", "title": "Bedtime Stories", "author": "Bo"}
        ],
        "playlists": [
            {"id": "p1", "name": "Morning", "itemCount": 2}
        ]
    })
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_then_fetch_with_bearer_token() {
    let fixture = TestFixture::new().await;
    fixture.mount_login("tok-1").await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .expect(2)
        .mount(&fixture.host)
        .await;

    let service = fixture.service();
    let first = service.get_library_data(None).await.expect("Should fetch library");
    let second = service.get_library_data(None).await.expect("Should fetch again");

    assert_eq!(first.card_count(), 2);
    assert_eq!(first.playlists[0].item_count, 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_session_cookies_are_forwarded() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "sid=xyz; Path=/; HttpOnly")
                .append_header("Set-Cookie", "csrf=123; Path=/")
                .set_body_json(json!({"success": true})),
        )
        .expect(1)
        .mount(&fixture.host)
        .await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .and(header("Cookie", "sid=xyz; csrf=123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .expect(1)
        .mount(&fixture.host)
        .await;

    let service = fixture.service();
    let session = service.authenticate_host(None).await.expect("Should log in");
    assert!(session.token.is_none());
    assert_eq!(session.cookies, vec!["sid=xyz", "csrf=123"]);

    let payload = service.get_library_data(None).await.expect("Should fetch library");
    assert_eq!(payload.card_count(), 2);
}

#[tokio::test]
async fn test_rejected_credentials_surface_host_message() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "Invalid email or password"
        })))
        .expect(1)
        .mount(&fixture.host)
        .await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .expect(0)
        .mount(&fixture.host)
        .await;

    let err = fixture
        .service()
        .get_library_data(None)
        .await
        .expect_err("Login should be rejected");

    match &err {
        ServiceError::Auth(AuthError::CredentialsRejected { message, .. }) => {
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_success_false_with_200_is_rejection() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Account locked"
        })))
        .mount(&fixture.host)
        .await;

    let err = fixture
        .service()
        .authenticate_host(None)
        .await
        .expect_err("Login should be rejected");
    assert!(err.user_message().contains("Account locked"));
}

#[tokio::test]
async fn test_login_server_error_is_login_failure() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&fixture.host)
        .await;

    let err = fixture
        .service()
        .authenticate_host(None)
        .await
        .expect_err("Login should fail");
    assert!(matches!(err, ServiceError::Auth(AuthError::LoginFailed { .. })));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn test_login_timeout() {
    let host = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "late"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&host)
        .await;

    let client = HostClient::new(Duration::from_millis(100)).expect("Should build client");
    let err = client
        .login(&host.uri(), &LoginCredentials::new("u", "p"))
        .await
        .expect_err("Login should time out");

    assert!(matches!(err, AuthError::Timeout { after_ms: 100, .. }));
}

// =============================================================================
// Library
// =============================================================================

#[tokio::test]
async fn test_library_falls_back_to_api_path() {
    let fixture = TestFixture::new().await;
    fixture.mount_login("tok-1").await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&fixture.host)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/library"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .expect(1)
        .mount(&fixture.host)
        .await;

    let payload = fixture
        .service()
        .get_library_data(None)
        .await
        .expect("Should fetch via fallback");
    assert_eq!(payload.cards[0].title, "Princess Tales");
}

#[tokio::test]
async fn test_reauthenticates_after_401() {
    let fixture = TestFixture::new().await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "stale"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&fixture.host)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "fresh"})))
        .expect(1)
        .mount(&fixture.host)
        .await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&fixture.host)
        .await;
    Mock::given(method("GET"))
        .and(path("/library"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .expect(1)
        .mount(&fixture.host)
        .await;

    let service = fixture.service();
    let payload = service
        .get_library_data(None)
        .await
        .expect("Should recover with a fresh session");
    assert_eq!(payload.card_count(), 2);

    let session = service.authenticate_host(None).await.expect("Should be cached");
    assert_eq!(session.token.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_malformed_library_body() {
    let fixture = TestFixture::new().await;
    fixture.mount_login("tok-1").await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&fixture.host)
        .await;

    let err = fixture
        .service()
        .get_library_data(None)
        .await
        .expect_err("Body is not JSON");
    assert!(matches!(err, ServiceError::Fetch(FetchError::Malformed { .. })));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn test_partial_library_is_tolerated() {
    let fixture = TestFixture::new().await;
    fixture.mount_login("tok-1").await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"cards": [{"title": "Only Card"}]}
        })))
        .mount(&fixture.host)
        .await;

    let answer = fixture
        .service()
        .query_library(None, "how many cards and playlists are there")
        .await
        .expect("Should answer");
    assert_eq!(answer, "The library contains 1 cards and 0 playlists.");
}

#[tokio::test]
async fn test_hosts_do_not_share_sessions() {
    let fixture = TestFixture::new().await;
    let other = MockServer::start().await;
    fixture.mount_login("tok-a").await;

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-b"})))
        .expect(1)
        .mount(&other)
        .await;
    Mock::given(method("GET"))
        .and(path("/library"))
        .and(header("Authorization", "Bearer tok-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cards": []})))
        .expect(1)
        .mount(&other)
        .await;

    let service = fixture.service();
    let a = service.authenticate_host(None).await.expect("Should log in to a");
    let b_payload = service
        .get_library_data(Some(&other.uri()))
        .await
        .expect("Should fetch from b");

    assert_eq!(a.token.as_deref(), Some("tok-a"));
    assert!(b_payload.is_empty());
}

#[tokio::test]
async fn test_token_store_survives_restart() {
    let mut fixture = TestFixture::new().await;
    let dir = std::env::temp_dir().join(format!("bridge-mcp-e2e-{}", std::process::id()));
    let store = dir.join("tokens.json");
    let _ = std::fs::remove_file(&store);
    fixture.config.token_store = Some(store.clone());
    fixture.mount_login("persisted").await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .and(header("Authorization", "Bearer persisted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .expect(2)
        .mount(&fixture.host)
        .await;

    fixture
        .service()
        .get_library_data(None)
        .await
        .expect("First process logs in");
    fixture
        .service()
        .get_library_data(None)
        .await
        .expect("Second process reuses the stored token");

    let _ = std::fs::remove_dir_all(&dir);
}

// =============================================================================
// MCP tools
// =============================================================================

#[tokio::test]
async fn test_search_library_tool_call() {
    let fixture = TestFixture::new().await;
    fixture.mount_login("tok-1").await;

    Mock::given(method("GET"))
        .and(path("/library"))
        .respond_with(ResponseTemplate::new(200).set_body_json(library_body()))
        .mount(&fixture.host)
        .await;

    let server = McpServer::bridge();
    server
        .register_tools(all_tools(Arc::new(fixture.service())))
        .await;

    let request = McpRequest::new(1, "tools/call").with_params(json!({
        "name": "search_library",
        "arguments": {"query": "find cards with \"princess\" in the title"}
    }));
    let response = server
        .handle_request(request)
        .await
        .expect("Request has an id");
    let result = response.result.expect("Tool call should succeed");

    assert_eq!(result["isError"], false);
    assert_eq!(
        result["content"][0]["text"],
        "Cards with \"princess\" in title (1):\n- Princess Tales"
    );
}

#[tokio::test]
async fn test_tool_reports_unreachable_host() {
    let fixture = TestFixture::new().await;
    let config = BridgeConfig {
        default_host: "http://127.0.0.1:9".to_string(),
        ..fixture.config.clone()
    };

    let server = McpServer::bridge();
    server
        .register_tools(all_tools(Arc::new(
            LibraryService::from_config(&config).expect("Should build service"),
        )))
        .await;

    let request = McpRequest::new(2, "tools/call")
        .with_params(json!({"name": "authenticate_host", "arguments": {}}));
    let result = server
        .handle_request(request)
        .await
        .and_then(|r| r.result)
        .expect("Tool errors are results");

    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("Not authenticated with http://127.0.0.1:9"));
}
