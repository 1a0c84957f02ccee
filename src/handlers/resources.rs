use serde::Serialize;
use tracing::error;

use crate::ntp::TimeService;
use crate::protocol::ReadResourceResult;
use crate::session::SessionContext;

pub const TIME_RESOURCE_URI: &str = "ntp://time";

const MIME_JSON: &str = "application/json";
const MIME_TEXT: &str = "text/plain";

/// Static description of a readable resource.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
    pub description: &'static str,
}

pub static TIME_RESOURCE: ResourceDescriptor = ResourceDescriptor {
    uri: TIME_RESOURCE_URI,
    name: "NTP Server Time Information",
    mime_type: MIME_JSON,
    description: "Get current NTP server time information, including timestamp, \
                  local time comparison, etc.",
};

pub fn list() -> Vec<ResourceDescriptor> {
    vec![TIME_RESOURCE.clone()]
}

/// Handle `resources/read`.
///
/// Time source failures come back as `text/plain` contents, not as
/// JSON-RPC errors.
pub async fn read(uri: &str, time: &TimeService, session: &SessionContext) -> ReadResourceResult {
    if uri != TIME_RESOURCE_URI {
        return ReadResourceResult::single(uri, MIME_TEXT, format!("Unknown resource URI: {uri}"));
    }

    match time.current_time(None, session.bound_server()).await {
        Ok(sample) => match sample.to_pretty_json() {
            Ok(json) => ReadResourceResult::single(uri, MIME_JSON, json),
            Err(e) => {
                error!(error = %e, "failed to serialize time sample");
                ReadResourceResult::single(uri, MIME_TEXT, format!("Error: {e}"))
            }
        },
        Err(e) => {
            error!(error = %e, code = ?e.code(), "failed to get NTP time information");
            ReadResourceResult::single(uri, MIME_TEXT, format!("Error: {e}"))
        }
    }
}
