//! HTTP/SSE Transport for MCP
//!
//! Serves the same protocol as the stdio transport for clients that cannot
//! attach to process standard streams.
//!
//! Endpoints (path strings are a contract with existing clients):
//! - `GET /` and `GET /sse` — open a Server-Sent-Events stream, optionally
//!   resuming a session via `?sessionId=`
//! - `POST /message` — submit one JSON-RPC envelope; acknowledged with 202,
//!   the actual response arrives asynchronously on the matching SSE stream
//! - `GET /.well-known/mcp` — discovery document
//! - `GET /mcp`, `GET /mcp/ready` — capability/tool-list mirrors of the
//!   `initialize` response

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response, Sse, sse::Event, sse::KeepAlive},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec;
use super::types::{JsonRpcRequest, MCP_VERSION};
use crate::error::ServerError;
use crate::server::McpServer;

/// Keep-alive comment interval. Intermediary proxies and the client both
/// observe liveness; a write failure ends the stream and reaps the session.
const KEEP_ALIVE_SECS: u64 = 30;

/// Buffered responses per session. A stalled client that falls this far
/// behind starts losing deliveries — dropped, never queued unbounded.
const SESSION_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Sequential ports probed before startup fails. Bounded on purpose —
    /// this is a retry budget, not a port scan.
    pub max_port_attempts: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            max_port_attempts: 10,
        }
    }
}

impl HttpConfig {
    /// Defaults overridden by `SCAFFOLD_HTTP_HOST` / `SCAFFOLD_HTTP_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("SCAFFOLD_HTTP_HOST") {
            config.host = host;
        }
        if let Some(port) = std::env::var("SCAFFOLD_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
        {
            config.port = port;
        }
        config
    }
}

/// One connected SSE client. The sender feeds the open response stream; the
/// epoch distinguishes this connection from a later one reusing the same id.
struct SseSession {
    tx: mpsc::Sender<String>,
    epoch: u64,
    created_at: DateTime<Utc>,
}

/// Shared transport state. The session table is touched by new connections,
/// disconnect watchers and inbound POSTs, hence the mutex.
struct AppState {
    server: Arc<McpServer>,
    sessions: Mutex<HashMap<String, SseSession>>,
    epoch: AtomicU64,
}

impl AppState {
    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// HTTP transport for the MCP server.
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Bind a listener, probing sequential ports within the retry budget.
    pub async fn bind(&self) -> Result<(TcpListener, SocketAddr), ServerError> {
        for attempt in 0..self.config.max_port_attempts {
            let Some(port) = self.config.port.checked_add(attempt) else {
                break;
            };
            let addr: SocketAddr = format!("{}:{}", self.config.host, port)
                .parse()
                .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                    addr: format!("{}:{}", self.config.host, port),
                    detail: e.to_string(),
                })?;

            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let bound = listener.local_addr()?;
                    if attempt > 0 {
                        info!("Port {} was taken; bound {} instead", self.config.port, bound);
                    }
                    return Ok((listener, bound));
                }
                Err(e) => {
                    warn!("Could not bind {}: {}", addr, e);
                }
            }
        }

        Err(ServerError::Bind {
            host: self.config.host.clone(),
            start_port: self.config.port,
            attempts: self.config.max_port_attempts,
        })
    }

    /// Bind and serve until a shutdown signal arrives.
    pub async fn run(self, server: Arc<McpServer>) -> Result<(), ServerError> {
        let (listener, addr) = self.bind().await?;
        info!("MCP HTTP transport listening on http://{}", addr);
        Self::serve(listener, server).await
    }

    /// Serve on an already-bound listener (tests bind their own).
    pub async fn serve(listener: TcpListener, server: Arc<McpServer>) -> Result<(), ServerError> {
        let app = build_router(server);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("MCP HTTP transport shut down");
        Ok(())
    }
}

/// Build the transport router around a shared dispatcher.
pub fn build_router(server: Arc<McpServer>) -> Router {
    let state = Arc::new(AppState {
        server,
        sessions: Mutex::new(HashMap::new()),
        epoch: AtomicU64::new(0),
    });

    // Permissive by design: any origin may open a stream or submit an
    // envelope, and the layer short-circuits OPTIONS preflights.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_sse))
        .route("/sse", get(handle_sse))
        .route("/message", post(handle_message))
        .route("/.well-known/mcp", get(handle_well_known))
        .route("/mcp", get(handle_mcp_info))
        .route("/mcp/ready", get(handle_mcp_ready))
        .layer(ServiceBuilder::new().concurrency_limit(64).layer(cors))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Register a session and return the receiving end of its delivery channel.
/// A reconnect under the same id replaces the previous connection; a watcher
/// reaps the table entry when the client goes away — unless a newer
/// connection already took the slot.
async fn register_session(state: &Arc<AppState>, session_id: String) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(SESSION_CHANNEL_CAPACITY);
    let epoch = state.next_epoch();

    {
        let mut sessions = state.sessions.lock().await;
        if sessions
            .insert(
                session_id.clone(),
                SseSession {
                    tx: tx.clone(),
                    epoch,
                    created_at: Utc::now(),
                },
            )
            .is_some()
        {
            info!("SSE session reconnected: {}", session_id);
        } else {
            info!("SSE session opened: {}", session_id);
        }
    }

    let watcher_state = Arc::clone(state);
    tokio::spawn(async move {
        // Resolves once the receiver (the SSE stream) is dropped.
        tx.closed().await;
        let mut sessions = watcher_state.sessions.lock().await;
        if sessions.get(&session_id).is_some_and(|s| s.epoch == epoch) {
            if let Some(session) = sessions.remove(&session_id) {
                info!(
                    "SSE session closed: {} (opened {})",
                    session_id, session.created_at
                );
            }
        }
    });

    rx
}

/// Push a serialized response to one session, or to every open session when
/// none was identified. Dead or missing targets drop the payload silently.
async fn deliver(state: &AppState, target: Option<&str>, payload: String) {
    let sessions = state.sessions.lock().await;
    match target {
        Some(id) => match sessions.get(id) {
            Some(session) => {
                if session.tx.try_send(payload).is_err() {
                    debug!("Dropping response for stalled/closed session {}", id);
                }
            }
            None => debug!("Dropping response for unknown session {}", id),
        },
        None => {
            for (id, session) in sessions.iter() {
                if session.tx.try_send(payload.clone()).is_err() {
                    debug!("Dropping broadcast for stalled/closed session {}", id);
                }
            }
        }
    }
}

/// GET / and GET /sse — open the event stream.
async fn handle_sse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let rx = register_session(&state, session_id.clone()).await;

    let connected = JsonRpcRequest::notification(
        "mcp/connected",
        json!({
            "sessionId": session_id,
            "serverInfo": state.server.info(),
            "protocolVersion": MCP_VERSION,
        }),
    );
    let first = Event::default()
        .event("mcp/connected")
        .data(codec::encode_notification(&connected));

    let responses = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|payload| (Event::default().data(payload), rx))
    });
    let events = stream::once(async move { first })
        .chain(responses)
        .map(Ok::<_, Infallible>);

    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    );

    ([("x-session-id", session_id)], sse).into_response()
}

/// POST /message — submit one envelope. The HTTP response is only an
/// acknowledgment; the JSON-RPC response travels over SSE.
async fn handle_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    // The body is fully buffered by the extractor, so chunked uploads are
    // reassembled before parsing.
    let request = match codec::decode_request(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Rejecting unparsable POST body: {:?}", e);
            let error_body = codec::encode_response(&e.into_response());
            return (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "application/json")],
                error_body,
            )
                .into_response();
        }
    };

    // Target session: header wins, query parameter is the fallback. With
    // neither, the eventual response broadcasts to every open session.
    let target = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.session_id);

    let ack = json!({ "status": "accepted", "id": request.id.clone() });

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Some(response) = task_state.server.handle_request(request).await {
            let payload = codec::encode_response(&response);
            deliver(&task_state, target.as_deref(), payload).await;
        }
    });

    (StatusCode::ACCEPTED, Json(ack)).into_response()
}

/// GET /.well-known/mcp — discovery without opening a stream.
async fn handle_well_known(State(state): State<Arc<AppState>>) -> Json<Value> {
    let info = state.server.info();
    Json(json!({
        "name": info.name,
        "version": info.version,
        "protocolVersion": MCP_VERSION,
        "transports": ["stdio", "http"],
        "endpoints": {
            "sse": "/sse",
            "message": "/message",
            "info": "/mcp",
            "ready": "/mcp/ready",
        },
        "tools": state.server.registry().list(),
    }))
}

/// GET /mcp — mirror of the `initialize` result.
async fn handle_mcp_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::to_value(state.server.initialize_result()).unwrap_or_else(|_| json!({})))
}

/// GET /mcp/ready — mirror of the stdio `mcp/ready` announcement.
async fn handle_mcp_ready(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ready": true,
        "serverInfo": state.server.info(),
        "tools": state.server.registry().list(),
    }))
}

/// Graceful shutdown signal (SIGINT / SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
