use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cli::Cli;
use crate::ntp::QUERY_TIMEOUT;
use crate::transport::Transport;

/// NTP server used when neither `NTP_DOMAIN_URL` nor `--ntp-server` is given.
pub const DEFAULT_NTP_SERVER: &str = "cn.ntp.org.cn";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PORT must be an integer between 0 and 65535, got '{0}'")]
    InvalidPort(String),
    #[error("cannot load env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

/// Server configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    /// Process-wide default NTP server; `None` when configured blank.
    pub ntp_server: Option<String>,
    pub query_timeout: Duration,
}

impl ServerConfig {
    /// Resolve from flags and the process environment.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Resolve with environment values taking precedence over flags.
    ///
    /// - `TRANSPORT`: `stdio` or `sse`; anything else falls back to `stdio`
    /// - `HOST`, `PORT`: SSE listen address
    /// - `NTP_DOMAIN_URL`: default NTP server; blank disables the default
    pub fn resolve(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let requested = env("TRANSPORT").unwrap_or_else(|| cli.transport.clone());
        let transport = Transport::parse(&requested).unwrap_or_else(|| {
            warn!(transport = %requested, "invalid transport method, using 'stdio'");
            Transport::Stdio
        });

        let host = env("HOST").unwrap_or_else(|| cli.host.clone());

        let port = match env("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => cli.port,
        };

        let ntp_server = env("NTP_DOMAIN_URL")
            .or_else(|| cli.ntp_server.clone())
            .unwrap_or_else(|| DEFAULT_NTP_SERVER.to_string());
        let ntp_server = Some(ntp_server.trim().to_string()).filter(|s| !s.is_empty());

        let config = Self {
            transport,
            host,
            port,
            ntp_server,
            query_timeout: QUERY_TIMEOUT,
        };
        debug!(?config, "configuration resolved");
        Ok(config)
    }
}

/// Load a dotenv file, overriding variables already set.
///
/// An explicit path must exist; without one, `./.env` is loaded if present.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading environment variables from file");
            dotenvy::from_path_override(path).map_err(|source| ConfigError::EnvFile {
                path: path.display().to_string(),
                source,
            })
        }
        None => match dotenvy::dotenv_override() {
            Ok(found) => {
                debug!(path = %found.display(), "loaded default .env file");
                Ok(())
            }
            Err(e) if e.not_found() => Ok(()),
            Err(source) => Err(ConfigError::EnvFile {
                path: ".env".to_string(),
                source,
            }),
        },
    }
}
