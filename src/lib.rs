//! MCP server for NTP time.
//!
//! Exposes the `ntp://time` resource and the `get_current_time` tool over
//! JSON-RPC 2.0, either on stdio (one session per process) or over HTTP with
//! Server-Sent Events (one session per connection, bound to the NTP server
//! named in the `ntp_url` header).

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod ntp;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub mod schema;
