use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::ntp::TimeService;
use crate::protocol::{
    GetCurrentTimeArgs, JsonRpcError, McpErrorCode, McpErrorResponse, ToolCallParams, ToolResult,
};
use crate::schema::validate_value;
use crate::session::SessionContext;

pub const GET_CURRENT_TIME: &str = "get_current_time";

/// Static description of an invokable tool.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn get_current_time_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: GET_CURRENT_TIME,
        description: "Get current time from NTP server",
        input_schema: json!({
            "type": "object",
            "properties": {
                "ntp_server": {
                    "type": "string",
                    "description": "NTP server address (optional, if not provided, the \
                                    request header or environment variable configuration \
                                    will be used)"
                }
            },
            "required": []
        }),
    }
}

pub fn list() -> Vec<ToolDescriptor> {
    vec![get_current_time_descriptor()]
}

/// Handle `tools/call`.
///
/// Unknown tools and arguments that do not match the input schema are
/// protocol errors. Time source failures are returned as `Error: ...` text.
pub async fn call(
    params: &ToolCallParams,
    time: &TimeService,
    session: &SessionContext,
) -> Result<ToolResult, JsonRpcError> {
    match params.name.as_str() {
        GET_CURRENT_TIME => {
            let args = parse_arguments(params.arguments.as_ref())?;
            Ok(get_current_time(args, time, session).await)
        }
        other => Err(McpErrorResponse::unknown_tool(other).into()),
    }
}

async fn get_current_time(
    args: GetCurrentTimeArgs,
    time: &TimeService,
    session: &SessionContext,
) -> ToolResult {
    let sample = match time
        .current_time(args.ntp_server.as_deref(), session.bound_server())
        .await
    {
        Ok(sample) => sample,
        Err(e) => {
            error!(tool = GET_CURRENT_TIME, error = %e, code = ?e.code(), "tool execution failed");
            return ToolResult::text(format!("Error: {e}"));
        }
    };

    match sample.to_pretty_json() {
        Ok(json) => ToolResult::text(json),
        Err(e) => ToolResult::text(format!("Error: {e}")),
    }
}

/// Validate against the advertised schema, treating `null` members as absent.
fn parse_arguments(arguments: Option<&Value>) -> Result<GetCurrentTimeArgs, JsonRpcError> {
    let mut args = arguments.cloned().unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut args {
        map.retain(|_, v| !v.is_null());
    }

    let descriptor = get_current_time_descriptor();
    validate_value(&descriptor.input_schema, &args).map_err(|e| {
        JsonRpcError::from(McpErrorResponse::new(
            McpErrorCode::InvalidArguments,
            format!("Invalid arguments for {GET_CURRENT_TIME}: {e}"),
        ))
    })?;

    serde_json::from_value(args).map_err(|e| {
        JsonRpcError::from(McpErrorResponse::new(
            McpErrorCode::InvalidArguments,
            format!("Invalid arguments for {GET_CURRENT_TIME}: {e}"),
        ))
    })
}
