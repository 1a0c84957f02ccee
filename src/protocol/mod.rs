pub mod request;
pub mod response;

pub use request::{
    ClientInfo, GetCurrentTimeArgs, InitializeParams, JsonRpcRequest, ReadResourceParams, RpcId,
    ToolCallParams,
};
pub use response::{
    JsonRpcError, JsonRpcResponse, McpError, McpErrorCode, McpErrorResponse, ReadResourceResult,
    ResourceContents, ToolResult, ToolResultContent,
};
