//! Per-connection session state.

use tracing::{error, info};

use crate::ntp::{TimeError, TimeService};

/// Lifecycle of one connection's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initializing,
    Ready,
    Failed,
    Closed,
}

/// State owned by exactly one connection.
///
/// `bound_server` is fixed at construction: the `ntp_url` header for SSE
/// sessions, `None` for the stdio session.
#[derive(Debug)]
pub struct SessionContext {
    state: SessionState,
    bound_server: Option<String>,
    initialized: bool,
}

impl SessionContext {
    pub fn new(bound_server: Option<String>) -> Self {
        Self {
            state: SessionState::Created,
            bound_server,
            initialized: false,
        }
    }

    pub fn bound_server(&self) -> Option<&str> {
        self.bound_server.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once a probe has succeeded; stays true after `close`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Probe the time source once; the sample itself is discarded.
    ///
    /// No-op once initialized or closed. A failed probe can be retried.
    pub async fn initialize(&mut self, time: &TimeService) -> Result<(), TimeError> {
        if self.initialized || self.state == SessionState::Closed {
            return Ok(());
        }

        info!("initializing NTP time session");
        self.state = SessionState::Initializing;

        let probe = time.current_time(None, self.bound_server.as_deref()).await;
        match probe {
            Ok(sample) => {
                info!(server = %sample.server, "NTP session initialized");
                self.state = SessionState::Ready;
                self.initialized = true;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, code = ?e.code(), "NTP session initialization failed");
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}
