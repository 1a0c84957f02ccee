use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// MCP-NTP server: NTP time as an MCP resource and tool, over stdio or SSE.
///
/// The environment variables TRANSPORT, HOST, PORT and NTP_DOMAIN_URL take
/// precedence over the corresponding flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-ntp", version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to a .env file
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Transport (stdio or sse)
    #[arg(long, default_value = "stdio", value_parser = ["stdio", "sse"])]
    pub transport: String,

    /// Listen address for the SSE transport
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port for the SSE transport
    #[arg(long, default_value_t = 18002)]
    pub port: u16,

    /// Default NTP server
    #[arg(long, value_name = "SERVER")]
    pub ntp_server: Option<String>,
}
