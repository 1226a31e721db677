//! MCP Adapter (§4.2): stdio and Streamable-HTTP transports for Model Context
//! Protocol servers, surfaced as ordinary registered tools.

mod adapter;
mod error;
mod session;
mod session_http;

pub use adapter::{McpAdapter, McpServerConfig, McpTransportConfig};
pub use error::McpError;
pub use session::McpSession;
pub use session_http::McpHttpSession;
