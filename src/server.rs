use std::sync::Arc;

use tracing::{debug, warn};

use crate::handlers;
use crate::handlers::resources::ResourceDescriptor;
use crate::handlers::tools::ToolDescriptor;
use crate::ntp::{TimeError, TimeService};
use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ReadResourceResult, ToolCallParams, ToolResult,
};
use crate::session::{SessionContext, SessionState};

/// MCP server bound to one session.
///
/// Transport agnostic: transports feed it raw JSON-RPC frames and write back
/// whatever it returns.
pub struct McpServer {
    time: Arc<TimeService>,
    session: SessionContext,
    handshake_complete: bool,
}

impl McpServer {
    pub fn new(time: Arc<TimeService>, session: SessionContext) -> Self {
        Self {
            time,
            session,
            handshake_complete: false,
        }
    }

    /// Run the session health probe. Must succeed before any frame is served.
    pub async fn start(&mut self) -> Result<(), TimeError> {
        self.session.initialize(&self.time).await
    }

    pub fn close(&mut self) {
        self.session.close();
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn list_resources(&self) -> Vec<ResourceDescriptor> {
        handlers::resources::list()
    }

    pub async fn read_resource(&self, uri: &str) -> ReadResourceResult {
        handlers::resources::read(uri, &self.time, &self.session).await
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        handlers::tools::list()
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<ToolResult, JsonRpcError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        handlers::tools::call(&params, &self.time, &self.session).await
    }

    /// Parse and serve one raw frame. `None` means nothing to send back.
    pub async fn handle_message(&mut self, raw: &str) -> Option<JsonRpcResponse> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(req) => self.handle_request(&req).await,
            Err(e) => {
                warn!(error = %e, "parse error");
                Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
            }
        }
    }

    pub async fn handle_request(&mut self, req: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Validate jsonrpc version
        if req.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::invalid_request(),
            ));
        }

        if self.session.state() != SessionState::Ready {
            if req.is_notification() {
                return None;
            }
            return Some(JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::internal_error("Session is not ready"),
            ));
        }

        // Initialization gate: only `initialize` is allowed before handshake completes
        if !self.handshake_complete && req.method != "initialize" {
            if req.is_notification() {
                return None;
            }
            return Some(JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::invalid_request_with("Server not initialized"),
            ));
        }

        debug!(method = %req.method, "dispatching request");
        let resp = handlers::dispatch(req, &self.time, &self.session).await;

        if req.method == "initialize" {
            self.handshake_complete = true;
        }

        resp
    }
}
