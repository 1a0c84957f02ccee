#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_ntp_server::ntp::{NtpReading, QueryError, TimeService, TimeSource};
use mcp_ntp_server::server::McpServer;
use mcp_ntp_server::session::SessionContext;

pub const SERVER_TIME: f64 = 1_750_000_000.125;

/// Answers every query with `SERVER_TIME` and remembers who was asked.
#[derive(Default)]
pub struct RecordingSource {
    asked: Mutex<Vec<String>>,
    fail_after: Option<usize>,
}

impl RecordingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Succeeds `n` times, then reports the server unreachable.
    pub fn failing_after(n: usize) -> Arc<Self> {
        Arc::new(Self {
            asked: Mutex::new(Vec::new()),
            fail_after: Some(n),
        })
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl TimeSource for RecordingSource {
    fn query(&self, server: &str, _timeout: Duration) -> Result<NtpReading, QueryError> {
        let mut asked = self.asked.lock().unwrap();
        asked.push(server.to_string());
        if let Some(limit) = self.fail_after {
            if asked.len() > limit {
                return Err(QueryError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
        }
        Ok(NtpReading {
            transmit_time: SERVER_TIME,
            round_trip_delay: 0.02,
        })
    }
}

pub fn time_service(source: Arc<RecordingSource>, default: Option<&str>) -> Arc<TimeService> {
    Arc::new(TimeService::new(source, default.map(str::to_owned)))
}

/// A started server whose handshake has completed.
pub async fn ready_server(time: Arc<TimeService>, bound: Option<&str>) -> McpServer {
    let mut server = McpServer::new(time, SessionContext::new(bound.map(str::to_owned)));
    server.start().await.expect("session probe failed");
    let init = r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"0"}}}"#;
    server.handle_message(init).await.expect("initialize response");
    server
        .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    server
}
