//! MCP tool implementations
//!
//! | Tool                | Purpose                                     |
//! |---------------------|---------------------------------------------|
//! | `authenticate_host` | log in to a host (cached per host)          |
//! | `get_library_data`  | fetch all cards and playlists               |
//! | `search_library`    | answer a free-text question about a library |
//! | `logout_host`       | forget a host's session                     |

pub mod library;

use crate::server::Tool;
use crate::service::LibraryService;
use std::sync::Arc;

pub use library::{
    library_tools, AuthenticateHostTool, GetLibraryDataTool, LogoutHostTool, SearchLibraryTool,
};

/// Get all tools.
pub fn all_tools(service: Arc<LibraryService>) -> Vec<Arc<dyn Tool>> {
    library_tools(service)
}
