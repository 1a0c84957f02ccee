pub mod resources;
pub mod tools;

use tracing::debug;

use crate::ntp::TimeService;
use crate::protocol::{
    InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ReadResourceParams,
    ToolCallParams,
};
use crate::session::SessionContext;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "mcp-ntp";

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
pub async fn dispatch(
    req: &JsonRpcRequest,
    time: &TimeService,
    session: &SessionContext,
) -> Option<JsonRpcResponse> {
    if req.is_notification() {
        debug!(method = %req.method, "notification received");
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => {
            if let Some(params) = req
                .params
                .as_ref()
                .and_then(|v| serde_json::from_value::<InitializeParams>(v.clone()).ok())
            {
                let client = params.client_info.as_ref();
                debug!(
                    protocol_version = ?params.protocol_version,
                    client_name = ?client.and_then(|c| c.name.as_deref()),
                    client_version = ?client.and_then(|c| c.version.as_deref()),
                    "initialize"
                );
            }
            let result = serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "resources": {},
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            JsonRpcResponse::success(req.id.clone(), result)
        }

        "ping" => JsonRpcResponse::success(req.id.clone(), serde_json::json!({})),

        "resources/list" => {
            let result = serde_json::json!({ "resources": resources::list() });
            JsonRpcResponse::success(req.id.clone(), result)
        }

        "resources/read" => {
            let params: ReadResourceParams = match parse_params(req) {
                Ok(p) => p,
                Err(e) => return Some(JsonRpcResponse::error(req.id.clone(), e)),
            };
            let result = resources::read(&params.uri, time, session).await;
            to_success(req, &result)
        }

        "tools/list" => {
            let result = serde_json::json!({ "tools": tools::list() });
            JsonRpcResponse::success(req.id.clone(), result)
        }

        "tools/call" => {
            let params: ToolCallParams = match parse_params(req) {
                Ok(p) => p,
                Err(e) => return Some(JsonRpcResponse::error(req.id.clone(), e)),
            };
            match tools::call(&params, time, session).await {
                Ok(tool_result) => to_success(req, &tool_result),
                Err(e) => JsonRpcResponse::error(req.id.clone(), e),
            }
        }

        _ => JsonRpcResponse::error(req.id.clone(), JsonRpcError::method_not_found(&req.method)),
    };

    Some(response)
}

fn parse_params<T: serde::de::DeserializeOwned>(req: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    match &req.params {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            JsonRpcError::invalid_params(format!("Invalid {} params: {e}", req.method))
        }),
        None => Err(JsonRpcError::invalid_params(format!(
            "Missing params for {}",
            req.method
        ))),
    }
}

fn to_success<T: serde::Serialize>(req: &JsonRpcRequest, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(req.id.clone(), value),
        Err(e) => JsonRpcResponse::error(req.id.clone(), JsonRpcError::internal_error(e.to_string())),
    }
}
