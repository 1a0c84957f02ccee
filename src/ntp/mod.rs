//! Time source adapter.
//!
//! [`TimeService`] picks the server to ask (call argument, then the
//! session's bound server, then the process default), runs one synchronous
//! [`TimeSource`] query on the blocking pool, and turns the reading into a
//! [`TimeSample`].

pub mod sample;
pub mod sntp;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::protocol::McpErrorCode;

pub use sample::TimeSample;
pub use sntp::{QueryError, SntpClient};

/// Timeout for a single time-server round trip.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw result of one exchange with a time server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NtpReading {
    /// Server transmit timestamp, Unix seconds.
    pub transmit_time: f64,
    pub round_trip_delay: f64,
}

/// A blocking, single-shot time query.
///
/// Implementations must not retry; `timeout` bounds the whole exchange.
pub trait TimeSource: Send + Sync + 'static {
    fn query(&self, server: &str, timeout: Duration) -> Result<NtpReading, QueryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error(
        "NTP server address is not configured. Set the NTP_DOMAIN_URL environment variable \
         or provide ntp_url in the request header."
    )]
    NotConfigured,
    #[error("NTP request to {server} failed: {source}")]
    SourceUnavailable {
        server: String,
        #[source]
        source: QueryError,
    },
}

impl TimeError {
    pub fn code(&self) -> McpErrorCode {
        match self {
            Self::NotConfigured => McpErrorCode::NotConfigured,
            Self::SourceUnavailable { .. } => McpErrorCode::SourceUnavailable,
        }
    }
}

/// Process-wide time query front end, shared read-only by every session.
pub struct TimeService {
    source: Arc<dyn TimeSource>,
    default_server: Option<String>,
    timeout: Duration,
}

impl TimeService {
    pub fn new(source: Arc<dyn TimeSource>, default_server: Option<String>) -> Self {
        Self {
            source,
            default_server,
            timeout: QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_server(&self) -> Option<&str> {
        self.default_server.as_deref()
    }

    /// First non-blank of `requested`, `bound`, and the process default, trimmed.
    pub fn resolve_server(
        &self,
        requested: Option<&str>,
        bound: Option<&str>,
    ) -> Result<String, TimeError> {
        [requested, bound, self.default_server.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or(TimeError::NotConfigured)
    }

    /// Resolve the server and fetch a fresh sample from it.
    pub async fn current_time(
        &self,
        requested: Option<&str>,
        bound: Option<&str>,
    ) -> Result<TimeSample, TimeError> {
        let server = self.resolve_server(requested, bound)?;
        debug!(server = %server, "querying time server");

        let source = Arc::clone(&self.source);
        let timeout = self.timeout;
        let target = server.clone();
        let task = tokio::task::spawn_blocking(move || source.query(&target, timeout));

        let reading = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(reading))) => reading,
            Ok(Ok(Err(source))) => return Err(TimeError::SourceUnavailable { server, source }),
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "time query task failed");
                return Err(TimeError::SourceUnavailable {
                    server,
                    source: QueryError::Interrupted(join_err.to_string()),
                });
            }
            Err(_) => {
                return Err(TimeError::SourceUnavailable {
                    server,
                    source: QueryError::TimedOut(timeout),
                })
            }
        };

        Ok(TimeSample::from_reading(server, &reading, chrono::Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        asked: Mutex<Vec<String>>,
    }

    impl TimeSource for Recorder {
        fn query(&self, server: &str, _timeout: Duration) -> Result<NtpReading, QueryError> {
            self.asked.lock().unwrap().push(server.to_string());
            Ok(NtpReading {
                transmit_time: 1_700_000_000.0,
                round_trip_delay: 0.01,
            })
        }
    }

    struct Unreachable;

    impl TimeSource for Unreachable {
        fn query(&self, _server: &str, _timeout: Duration) -> Result<NtpReading, QueryError> {
            Err(QueryError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }

    struct Stalled;

    impl TimeSource for Stalled {
        fn query(&self, _server: &str, timeout: Duration) -> Result<NtpReading, QueryError> {
            std::thread::sleep(timeout * 4);
            Err(QueryError::TimedOut(timeout))
        }
    }

    fn service(default: Option<&str>) -> TimeService {
        TimeService::new(Arc::new(Recorder::default()), default.map(str::to_owned))
    }

    #[test]
    fn resolution_prefers_call_argument() {
        let svc = service(Some("z"));
        assert_eq!(svc.resolve_server(Some("x"), Some("y")).unwrap(), "x");
    }

    #[test]
    fn resolution_falls_through_blank_values() {
        let svc = service(Some("z"));
        assert_eq!(svc.resolve_server(Some("   "), Some("y")).unwrap(), "y");
        assert_eq!(svc.resolve_server(None, Some("y")).unwrap(), "y");
        assert_eq!(svc.resolve_server(None, None).unwrap(), "z");
        assert_eq!(svc.resolve_server(Some(""), Some("\t")).unwrap(), "z");
    }

    #[test]
    fn resolution_trims_chosen_name() {
        let svc = service(None);
        assert_eq!(svc.resolve_server(Some("  time.example  "), None).unwrap(), "time.example");
    }

    #[test]
    fn resolution_without_any_server_is_configuration_error() {
        let svc = service(Some("  "));
        let err = svc.resolve_server(Some(""), None).unwrap_err();
        assert!(matches!(err, TimeError::NotConfigured));
        assert_eq!(err.code(), McpErrorCode::NotConfigured);
    }

    #[tokio::test]
    async fn current_time_queries_resolved_server() {
        let recorder = Arc::new(Recorder::default());
        let svc = TimeService::new(recorder.clone(), Some("z".into()));

        let sample = svc.current_time(None, Some("y")).await.unwrap();

        assert_eq!(sample.server, "y");
        assert_eq!(*recorder.asked.lock().unwrap(), vec!["y".to_string()]);
    }

    #[tokio::test]
    async fn current_time_wraps_source_failure() {
        let svc = TimeService::new(Arc::new(Unreachable), Some("z".into()));

        let err = svc.current_time(None, None).await.unwrap_err();

        assert_eq!(err.code(), McpErrorCode::SourceUnavailable);
        let message = err.to_string();
        assert!(message.contains("z"), "{message}");
        assert!(message.contains("connection refused"), "{message}");
    }

    #[tokio::test]
    async fn current_time_enforces_timeout() {
        let svc = TimeService::new(Arc::new(Stalled), Some("z".into()))
            .with_timeout(Duration::from_millis(50));

        let err = svc.current_time(None, None).await.unwrap_err();

        assert!(matches!(
            err,
            TimeError::SourceUnavailable {
                source: QueryError::TimedOut(_),
                ..
            }
        ));
    }
}
