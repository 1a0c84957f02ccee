//! HTTP transport: Server-Sent Events for server→client frames, POST for
//! client→server frames.
//!
//! `GET /sse` opens a session whose bound NTP server comes from the
//! `ntp_url` header. The first event (`endpoint`) tells the client where to
//! POST its frames; responses arrive as `message` events on the same stream.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::ntp::{TimeError, TimeService};
use crate::server::McpServer;
use crate::session::SessionContext;

/// Request header carrying the session's NTP server.
pub const NTP_URL_HEADER: &str = "ntp_url";

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages/";

const CHANNEL_CAPACITY: usize = 32;

/// Routing table from session id to the session's inbound frame queue.
///
/// Holds no session state; each session's context lives in its own task.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl SessionRegistry {
    async fn insert(&self, id: Uuid, inbound: mpsc::Sender<String>) {
        self.inner.write().await.insert(id, inbound);
    }

    async fn remove(&self, id: &Uuid) {
        self.inner.write().await.remove(id);
    }

    async fn sender(&self, id: &Uuid) -> Option<mpsc::Sender<String>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// A freshly opened session: its id and the stream of serialized responses.
pub struct OpenSession {
    pub id: Uuid,
    pub outbound: mpsc::Receiver<String>,
}

impl OpenSession {
    pub fn endpoint(&self) -> String {
        format!("{MESSAGES_PATH}?session_id={}", self.id.simple())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("session_id is required")]
    MissingSessionId,
    #[error("Invalid session ID")]
    InvalidSessionId,
    #[error("Could not find session")]
    UnknownSession,
    #[error("Could not parse message")]
    InvalidMessage,
}

impl IntoResponse for PostError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::UnknownSession => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Shared state of the HTTP transport.
#[derive(Clone)]
pub struct SseState {
    time: Arc<TimeService>,
    sessions: SessionRegistry,
}

impl SseState {
    pub fn new(time: Arc<TimeService>) -> Self {
        Self {
            time,
            sessions: SessionRegistry::default(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Create, probe, and register a session. Nothing is registered if the
    /// probe fails.
    pub async fn open_session(&self, bound_server: Option<String>) -> Result<OpenSession, TimeError> {
        let mut server = McpServer::new(Arc::clone(&self.time), SessionContext::new(bound_server));
        server.start().await?;

        let id = Uuid::new_v4();
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        self.sessions.insert(id, inbound_tx).await;
        tokio::spawn(run_session(server, id, inbound_rx, outbound_tx, self.sessions.clone()));

        info!(session_id = %id, "session opened");
        Ok(OpenSession {
            id,
            outbound: outbound_rx,
        })
    }

    /// Route one client frame to its session.
    pub async fn post_message(&self, session_id: Option<&str>, body: String) -> Result<(), PostError> {
        let raw = session_id.ok_or(PostError::MissingSessionId)?;
        let id = Uuid::parse_str(raw).map_err(|_| PostError::InvalidSessionId)?;
        let inbound = self.sessions.sender(&id).await.ok_or(PostError::UnknownSession)?;

        if serde_json::from_str::<serde_json::Value>(&body).is_err() {
            warn!(session_id = %id, "could not parse message");
            return Err(PostError::InvalidMessage);
        }

        inbound.send(body).await.map_err(|_| PostError::UnknownSession)
    }
}

/// One session's task: owns the server and its context until either side
/// goes away.
async fn run_session(
    mut server: McpServer,
    id: Uuid,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
    sessions: SessionRegistry,
) {
    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(frame) = frame else { break };
                let Some(resp) = server.handle_message(&frame).await else { continue };
                match serde_json::to_string(&resp) {
                    Ok(json) => {
                        if outbound.send(json).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(session_id = %id, error = %e, "failed to serialize response"),
                }
            }
            _ = outbound.closed() => break,
        }
    }

    sessions.remove(&id).await;
    server.close();
    info!(session_id = %id, "session closed");
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

async fn handle_sse(State(state): State<SseState>, headers: HeaderMap) -> Response {
    let bound_server = headers
        .get(NTP_URL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    debug!(ntp_url = ?bound_server, "opening SSE session");

    let session = match state.open_session(bound_server).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "rejecting SSE connection");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Session initialization failed: {e}"),
            )
                .into_response();
        }
    };

    let endpoint = Event::default().event("endpoint").data(session.endpoint());
    let messages = stream::unfold(session.outbound, |mut rx| async move {
        rx.recv()
            .await
            .map(|json| (Event::default().event("message").data(json), rx))
    });
    let events = stream::once(async move { endpoint })
        .chain(messages)
        .map(Ok::<_, Infallible>);

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn handle_post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    match state.post_message(query.session_id.as_deref(), body).await {
        Ok(()) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => e.into_response(),
    }
}

pub fn router(state: SseState) -> Router {
    Router::new()
        .route(SSE_PATH, get(handle_sse))
        .route(MESSAGES_PATH, post(handle_post_message))
        .route("/messages", post(handle_post_message))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn run(time: Arc<TimeService>, host: &str, port: u16) -> Result<(), TransportError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(address = %format!("http://{addr}{SSE_PATH}"), "serving MCP over SSE");
    axum::serve(listener, router(SseState::new(time)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
