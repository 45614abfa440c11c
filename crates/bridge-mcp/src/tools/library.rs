//! Library MCP tools
//!
//! Tools for authenticating against a speaker host, fetching its library and
//! answering questions about it. Every tool takes an optional `host`; when
//! omitted the configured default host is used.

use crate::server::{McpServerError, McpServerResult, Tool, ToolContext};
use crate::service::LibraryService;
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use bridge_library::LibraryPayload;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

fn host_property() -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": "Base URL of the speaker host (defaults to the configured host)"
    })
}

fn parse_params<T: for<'de> Deserialize<'de>>(args: serde_json::Value) -> McpServerResult<T> {
    serde_json::from_value(args).map_err(|e| McpServerError::InvalidParams(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct HostParams {
    #[serde(default)]
    host: Option<String>,
}

/// Tool to log in to a host.
///
/// Reuses a cached session when one is still fresh.
pub struct AuthenticateHostTool {
    service: Arc<LibraryService>,
}

impl AuthenticateHostTool {
    /// Create the tool over a shared service.
    pub fn new(service: Arc<LibraryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for AuthenticateHostTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "authenticate_host",
            "Log in to a speaker host and cache the session for later library requests",
        )
        .with_category("auth")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": { "host": host_property() },
            "required": []
        }))
    }

    #[instrument(skip(self, args, context), fields(tool = "authenticate_host"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: HostParams = parse_params(args)?;
        debug!(correlation_id = ?context.correlation_id, host = ?params.host, "Authenticating");

        match self.service.authenticate_host(params.host.as_deref()).await {
            Ok(session) => Ok(ToolResult::json(serde_json::json!({
                "host": session.host,
                "authenticated": true,
                "session": session.fingerprint(),
                "has_token": session.token.is_some(),
                "cookies": session.cookies.len(),
                "acquired_at": session.acquired_at.to_rfc3339()
            }))),
            Err(e) => {
                warn!(error = %e, "Authentication failed");
                Ok(ToolResult::error(e.user_message()))
            }
        }
    }
}

/// Tool to fetch a host's full library.
pub struct GetLibraryDataTool {
    service: Arc<LibraryService>,
}

impl GetLibraryDataTool {
    /// Create the tool over a shared service.
    pub fn new(service: Arc<LibraryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for GetLibraryDataTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "get_library_data",
            "Fetch all cards and playlists in the library of a speaker host",
        )
        .with_category("library")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": { "host": host_property() },
            "required": []
        }))
    }

    #[instrument(skip(self, args, _context), fields(tool = "get_library_data"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: HostParams = parse_params(args)?;

        let host = match self.service.resolve_host(params.host.as_deref()) {
            Ok(host) => host,
            Err(e) => return Ok(ToolResult::error(e.user_message())),
        };

        match self.service.get_library_data(Some(&host)).await {
            Ok(payload) => Ok(ToolResult::json(serde_json::json!({
                "host": host,
                "card_count": payload.card_count(),
                "playlist_count": payload.playlist_count(),
                "cards": payload.cards,
                "playlists": payload.playlists
            }))),
            Err(e) => {
                error!("Failed to fetch library: {}", e);
                Ok(ToolResult::error(e.user_message()))
            }
        }
    }
}

/// Tool to answer a free-text question about a library.
///
/// Fetches the host's library unless a library object is passed inline.
pub struct SearchLibraryTool {
    service: Arc<LibraryService>,
}

impl SearchLibraryTool {
    /// Create the tool over a shared service.
    pub fn new(service: Arc<LibraryService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Deserialize)]
struct SearchLibraryParams {
    query: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    library: Option<serde_json::Value>,
}

#[async_trait]
impl Tool for SearchLibraryTool {
    fn definition(&self) -> ToolDefinition {
        let examples: Vec<&str> = self
            .service
            .dispatcher()
            .rules()
            .iter()
            .map(|rule| rule.example)
            .collect();

        ToolDefinition::new(
            "search_library",
            format!(
                "Answer a question about the cards and playlists in a library. Supported questions include: {}",
                examples.join("; ")
            ),
        )
        .with_category("library")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language question about the library"
                },
                "host": host_property(),
                "library": {
                    "type": "object",
                    "description": "Library payload ({cards, playlists}) to search instead of fetching one"
                }
            },
            "required": ["query"]
        }))
    }

    #[instrument(skip(self, args, _context), fields(tool = "search_library"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: SearchLibraryParams = parse_params(args)?;

        if let Some(ref library) = params.library {
            let payload = LibraryPayload::parse(library)
                .map_err(|e| McpServerError::InvalidParams(format!("library: {}", e)))?;
            return Ok(ToolResult::text(
                self.service.search_library(&payload, &params.query),
            ));
        }

        match self
            .service
            .query_library(params.host.as_deref(), &params.query)
            .await
        {
            Ok(answer) => Ok(ToolResult::text(answer)),
            Err(e) => {
                error!("Failed to search library: {}", e);
                Ok(ToolResult::error(e.user_message()))
            }
        }
    }
}

/// Tool to forget the session of a host.
pub struct LogoutHostTool {
    service: Arc<LibraryService>,
}

impl LogoutHostTool {
    /// Create the tool over a shared service.
    pub fn new(service: Arc<LibraryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for LogoutHostTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "logout_host",
            "Forget the cached session and stored token for a speaker host",
        )
        .with_category("auth")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": { "host": host_property() },
            "required": []
        }))
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: HostParams = parse_params(args)?;

        let host = match self.service.resolve_host(params.host.as_deref()) {
            Ok(host) => host,
            Err(e) => return Ok(ToolResult::error(e.user_message())),
        };

        match self.service.logout(Some(&host)).await {
            Ok(true) => Ok(ToolResult::text(format!("Logged out of {}", host))),
            Ok(false) => Ok(ToolResult::text(format!("No active session for {}", host))),
            Err(e) => Ok(ToolResult::error(e.user_message())),
        }
    }
}

/// Get all library tools over a shared service.
pub fn library_tools(service: Arc<LibraryService>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(AuthenticateHostTool::new(service.clone())),
        Arc::new(GetLibraryDataTool::new(service.clone())),
        Arc::new(SearchLibraryTool::new(service.clone())),
        Arc::new(LogoutHostTool::new(service)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{service_with, FetchStep, MockFetcher, TEST_HOST};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn tools_with(fetcher: MockFetcher) -> (Vec<Arc<dyn Tool>>, Arc<LibraryService>) {
        let (service, _, _) = service_with(fetcher);
        let service = Arc::new(service);
        (library_tools(service.clone()), service)
    }

    fn tool<'a>(tools: &'a [Arc<dyn Tool>], name: &str) -> &'a Arc<dyn Tool> {
        tools
            .iter()
            .find(|t| t.definition().name == name)
            .unwrap()
    }

    #[test]
    fn test_tool_definitions() {
        let (tools, _) = tools_with(MockFetcher::default());
        let names: Vec<String> = tools.iter().map(|t| t.definition().name).collect();
        assert_eq!(
            names,
            vec!["authenticate_host", "get_library_data", "search_library", "logout_host"]
        );

        let search = tool(&tools, "search_library").definition();
        assert_eq!(search.input_schema["required"], json!(["query"]));
        assert!(search.description.contains("list all playlists"));
    }

    #[tokio::test]
    async fn test_authenticate_host() {
        let (tools, _) = tools_with(MockFetcher::default());
        let result = tool(&tools, "authenticate_host")
            .execute(json!({}), &ToolContext::empty())
            .await
            .unwrap();

        assert!(!result.is_error);
        let body: serde_json::Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(body["host"], TEST_HOST);
        assert_eq!(body["authenticated"], true);
        assert!(!result.text_content().contains("token-1"));
    }

    #[tokio::test]
    async fn test_get_library_data() {
        let (tools, _) = tools_with(MockFetcher::default());
        let result = tool(&tools, "get_library_data")
            .execute(json!({"host": TEST_HOST}), &ToolContext::empty())
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&result.text_content()).unwrap();
        assert_eq!(body["card_count"], 2);
        assert_eq!(body["playlists"][0]["itemCount"], 3);
    }

    #[tokio::test]
    async fn test_search_library_fetches() {
        let (tools, _) = tools_with(MockFetcher::default());
        let result = tool(&tools, "search_library")
            .execute(json!({"query": "list all playlists"}), &ToolContext::empty())
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.text_content(), "Playlists (1):\n- Favourites (3 items)");
    }

    #[tokio::test]
    async fn test_search_library_inline_payload() {
        let fetcher = MockFetcher::default();
        let (service, _, fetcher) = service_with(fetcher);
        let tools = library_tools(Arc::new(service));

        let result = tool(&tools, "search_library")
            .execute(
                json!({
                    "query": "list all cards",
                    "library": {"cards": [{"title": "Inline"}]}
                }),
                &ToolContext::empty(),
            )
            .await
            .unwrap();

        assert_eq!(result.text_content(), "Cards (1):\n- Inline");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_library_requires_query() {
        let (tools, _) = tools_with(MockFetcher::default());
        let err = tool(&tools, "search_library")
            .execute(json!({"host": TEST_HOST}), &ToolContext::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, McpServerError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_unreachable_library_is_tool_error() {
        let fetcher = MockFetcher::scripted(vec![FetchStep::Unreachable]);
        let (tools, _) = tools_with(fetcher);

        let result = tool(&tools, "get_library_data")
            .execute(json!({}), &ToolContext::empty())
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result
            .text_content()
            .starts_with("Library service unreachable"));
    }

    #[tokio::test]
    async fn test_unknown_host_is_tool_error() {
        let (tools, _) = tools_with(MockFetcher::default());
        let result = tool(&tools, "logout_host")
            .execute(json!({"host": "speaker.local"}), &ToolContext::empty())
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(result.text_content(), "Unknown host: speaker.local");
    }

    #[tokio::test]
    async fn test_logout_host() {
        let (tools, service) = tools_with(MockFetcher::default());
        let logout = tool(&tools, "logout_host");

        let result = logout.execute(json!({}), &ToolContext::empty()).await.unwrap();
        assert_eq!(result.text_content(), format!("No active session for {}", TEST_HOST));

        service.authenticate_host(None).await.unwrap();
        let result = logout.execute(json!({}), &ToolContext::empty()).await.unwrap();
        assert_eq!(result.text_content(), format!("Logged out of {}", TEST_HOST));
    }
}
