//! Connection handlers for the Beacon server.
//!
//! Each relay holds one WebSocket connection. Frames it sends are decoded and
//! routed to the space registry; frames the registry emits for it are queued
//! on an unbounded channel and written by the connection task.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MetricsErrorSink};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use beacon_core::{BackSpaces, ChannelWatcher, ErrorSink, SpaceError, SpacesConfig, Watcher, WatcherId};
use beacon_protocol::{codec, Frame, FrameCodec};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Error code for frames that cannot be decoded.
pub const PROTOCOL_ERROR: u16 = 1001;
/// Error code sent before dropping a silent relay.
pub const HEARTBEAT_TIMEOUT: u16 = 1010;

/// Shared server state.
pub struct AppState {
    /// The authoritative space registry.
    pub spaces: BackSpaces,
    /// Server configuration.
    pub config: Config,
    errors: MetricsErrorSink,
    next_watcher: AtomicU64,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let spaces_config = SpacesConfig {
            max_spaces: config.limits.max_spaces,
        };

        Self {
            spaces: BackSpaces::with_config(spaces_config),
            config,
            errors: MetricsErrorSink,
            next_watcher: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a new connection.
    pub fn next_watcher_id(&self) -> WatcherId {
        self.next_watcher.fetch_add(1, Ordering::Relaxed)
    }

    /// Route a frame from a relay, answering it with an error frame if it
    /// cannot be applied.
    pub fn dispatch(&self, watcher: &Arc<dyn Watcher>, frame: Frame) {
        if let Err(e) = self.spaces.handle_frame(watcher, frame) {
            self.errors.report(&e);
            watcher.write(Frame::error(error_code(&e), e.to_string()));
        }
    }
}

/// Wire error code for a space error.
#[must_use]
pub fn error_code(error: &SpaceError) -> u16 {
    match error {
        SpaceError::InvalidSpaceName(_) => 1002,
        SpaceError::UnknownSpace(_) => 1003,
        SpaceError::UnknownWatcher { .. } => 1004,
        SpaceError::UnknownUser { .. } => 1005,
        SpaceError::EmptyFilter { .. } => 1006,
        SpaceError::MaxSpacesReached => 1007,
        SpaceError::UnexpectedFrame(_) => 1008,
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let path = config.transport.websocket_path.clone();
    let state = Arc::new(AppState::new(config));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Beacon server listening on {}", addr);
    info!("Relay endpoint: ws://{}{}", addr, path);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.spaces.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "spaces": stats.space_count,
        "watchers": stats.watcher_count,
        "users": stats.user_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max = state.config.limits.max_message_size;
    ws.max_message_size(max)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a relay connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let id = state.next_watcher_id();
    let (tx, mut outbound) = mpsc::unbounded_channel::<Frame>();
    let watcher: Arc<dyn Watcher> = Arc::new(ChannelWatcher::with_sender(id, tx));
    debug!(watcher = id, "Relay connected");

    let (mut sender, mut receiver) = socket.split();
    let mut codec = FrameCodec::new();

    let heartbeat = &state.config.heartbeat;
    let timeout = Duration::from_millis(heartbeat.timeout_ms);
    let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat.interval_ms));
    ticker.tick().await;
    let mut last_seen = Instant::now();

    'connection: loop {
        tokio::select! {
            biased;

            Some(frame) = outbound.recv() => {
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let start = Instant::now();
                        codec.extend(&data);
                        loop {
                            match codec.next_frame() {
                                Ok(Some(frame)) => {
                                    metrics::record_frame(data.len(), "inbound");
                                    state.dispatch(&watcher, frame);
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(watcher = id, error = %e, "Undecodable frame");
                                    metrics::record_error("protocol");
                                    let _ = send_frame(&mut sender, &Frame::error(PROTOCOL_ERROR, e.to_string())).await;
                                    break 'connection;
                                }
                            }
                        }
                        metrics::record_latency(start.elapsed().as_secs_f64());
                        metrics::set_space_stats(&state.spaces.stats());
                    }
                    Some(Ok(Message::Text(_))) => {
                        warn!(watcher = id, "Text message rejected");
                        metrics::record_error("protocol");
                        let _ = send_frame(&mut sender, &Frame::error(PROTOCOL_ERROR, "Binary frames only")).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(watcher = id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(watcher = id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(watcher = id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                if last_seen.elapsed() > timeout {
                    warn!(watcher = id, "Heartbeat timeout");
                    let _ = send_frame(&mut sender, &Frame::error(HEARTBEAT_TIMEOUT, "Heartbeat timeout")).await;
                    break;
                }
                if send_frame(&mut sender, &Frame::ping()).await.is_err() {
                    break;
                }
            }
        }
    }

    state.spaces.unwatch_all(id);
    metrics::set_space_stats(&state.spaces.stats());

    debug!(watcher = id, "Relay disconnected");
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_frame(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
