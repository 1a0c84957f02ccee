use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mcp_ntp_server::cli::Cli;
use mcp_ntp_server::config::{load_env_file, ServerConfig};
use mcp_ntp_server::logging::{init_logging, LoggingConfig};
use mcp_ntp_server::ntp::{SntpClient, TimeService};
use mcp_ntp_server::transport::{sse, stdio, Transport};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(&LoggingConfig::from_verbosity(cli.verbose));

    if let Err(e) = load_env_file(cli.env_file.as_deref()) {
        eprintln!("mcp-ntp: configuration error: {e}");
        std::process::exit(1);
    }

    let config = match ServerConfig::from_cli(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("mcp-ntp: configuration error: {e}");
            std::process::exit(1);
        }
    };

    let time = Arc::new(
        TimeService::new(Arc::new(SntpClient::default()), config.ntp_server.clone())
            .with_timeout(config.query_timeout),
    );

    info!(
        transport = %config.transport,
        ntp_server = ?config.ntp_server,
        "starting MCP-NTP server"
    );

    let result = match config.transport {
        Transport::Stdio => stdio::run(time).await,
        Transport::Sse => sse::run(time, &config.host, config.port).await,
    };

    info!("stopping MCP-NTP server");
    if let Err(e) = result {
        error!(error = %e, "fatal error");
        eprintln!("mcp-ntp: fatal error: {e}");
        std::process::exit(1);
    }
}
