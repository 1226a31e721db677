use thiserror::Error;

use crate::tool::ToolError;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("initialize: {0}")]
    Initialize(String),
    #[error("json-rpc error: {0}")]
    JsonRpc(String),
    #[error("tool registration: {0}")]
    Registration(#[from] ToolError),
}
