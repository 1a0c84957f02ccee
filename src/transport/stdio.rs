use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::error::TransportError;
use crate::ntp::TimeService;
use crate::protocol::{JsonRpcError, JsonRpcResponse};
use crate::server::McpServer;
use crate::session::SessionContext;

/// Maximum bytes per JSON-RPC message (1 MiB).
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Serve the process's single stdio session until stdin closes.
pub async fn run(time: Arc<TimeService>) -> Result<(), TransportError> {
    info!(ntp_server = ?time.default_server(), "starting stdio session");
    let mut server = McpServer::new(time, SessionContext::new(None));
    server.start().await?;

    info!("serving MCP over stdio");
    let result = serve(&mut server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
    server.close();
    info!("stdio session closed");
    result
}

/// Newline-delimited JSON-RPC loop over any reader/writer pair.
pub async fn serve<R, W>(server: &mut McpServer, mut reader: R, mut writer: W) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).await?;
        if n == 0 {
            break;
        }

        if n > MAX_MESSAGE_BYTES {
            warn!(bytes = n, limit = MAX_MESSAGE_BYTES, "message too large");
            write_response(
                &mut writer,
                &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
            )
            .await?;
            continue;
        }

        let text = match std::str::from_utf8(&raw) {
            Ok(s) => s,
            Err(_) => {
                write_response(
                    &mut writer,
                    &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
                )
                .await?;
                continue;
            }
        };

        if let Some(resp) = server.handle_message(text).await {
            write_response(&mut writer, &resp).await?;
        }
    }

    Ok(())
}

async fn write_response<W>(writer: &mut W, resp: &JsonRpcResponse) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let out = serde_json::to_string(resp)?;
    writer.write_all(out.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
