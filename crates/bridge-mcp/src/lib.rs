//! # Bridge MCP Server
//!
//! Exposes authenticated library access for speaker hosts as MCP tools and
//! as a small REST API.
//!
//! ## Tools
//!
//! - `authenticate_host`: log in to a host; sessions are cached per host
//! - `get_library_data`: fetch every card and playlist of a host
//! - `search_library`: answer a free-text question about a library
//! - `logout_host`: forget a host's session and stored token
//!
//! ## Transports
//!
//! - **stdio**: newline-delimited JSON-RPC ([`transport::run_stdio`])
//! - **HTTP**: REST endpoints plus `POST /mcp` ([`rest::router`])
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bridge_mcp::clients::BridgeConfig;
//! use bridge_mcp::{tools::all_tools, LibraryService, McpServer};
//! use std::sync::Arc;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::from_env();
//!     config.validate()?;
//!
//!     let service = Arc::new(LibraryService::from_config(&config)?);
//!     let server = McpServer::bridge();
//!     server.register_tools(all_tools(service)).await;
//!
//!     bridge_mcp::transport::run_stdio(&server).await?;
//!     Ok(())
//! }
//! ```

pub mod clients;
pub mod rest;
pub mod server;
pub mod service;
pub mod tools;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use server::{McpServer, McpServerError, McpServerResult, Tool, ToolContext};
pub use service::{LibraryService, ServiceError, ServiceResult};
pub use types::*;
