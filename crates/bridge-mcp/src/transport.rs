//! Newline-delimited JSON-RPC transport.
//!
//! One request per line in, one response per line out. Stdout carries
//! nothing but responses; diagnostics go through `tracing` to stderr.

use crate::server::McpServer;
use crate::types::{McpError, McpRequest, McpResponse, RequestId};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

/// Serve MCP over the process's stdin/stdout until stdin closes.
pub async fn run_stdio(server: &McpServer) -> std::io::Result<()> {
    info!("Serving MCP over stdio");
    serve_lines(
        server,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Serve MCP over any line-oriented reader/writer pair.
pub async fn serve_lines<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to read request line");
                return Err(e);
            }
        }

        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_message(server, line.trim()).await,
            Err(e) => {
                warn!(error = %e, "Request line is not valid UTF-8");
                Some(McpResponse::error(RequestId::Null, McpError::parse_error(e)))
            }
        };

        if let Some(response) = response {
            write_response(&mut writer, &response).await?;
        }
    }

    debug!("Input closed");
    Ok(())
}

/// Handle one raw JSON-RPC message. Notifications yield `None`.
pub async fn handle_message(server: &McpServer, raw: &str) -> Option<McpResponse> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => handle_value(server, value).await,
        Err(e) => Some(McpResponse::error(RequestId::Null, McpError::parse_error(e))),
    }
}

/// Handle one parsed JSON-RPC message.
pub async fn handle_value(server: &McpServer, value: Value) -> Option<McpResponse> {
    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok())
        .unwrap_or(RequestId::Null);

    match serde_json::from_value::<McpRequest>(value) {
        Ok(request) => server.handle_request(request).await,
        Err(e) => Some(McpResponse::error(id, McpError::invalid_request(e))),
    }
}

async fn write_response<W>(writer: &mut W, response: &McpResponse) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            return Ok(());
        }
    };
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}
