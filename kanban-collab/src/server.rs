//! Relay gateway: HTTP endpoints that turn board mutations into broadcasts.
//!
//! Architecture:
//! ```text
//! Client A ──POST /update-note──┐
//!                               ├── RelayGateway ── Relay::trigger("notes", event)
//! Client B ──POST /create-note──┘                        │
//!                                        ┌───────────────┴───────────────┐
//!                                        ▼                               ▼
//!                                  PusherRelay                      LocalRelay
//!                               (hosted broker)              (GET /events WebSocket)
//! ```
//!
//! The gateway holds no board state. Each accepted request produces exactly
//! one broadcast; bodies that do not decode into a valid payload are
//! rejected by the extractor before anything is sent.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use kanban_core::{BoardEvent, LogUpdated, NoteCreated, NoteMoved};

use crate::broadcast::LocalRelay;
use crate::config::GATEWAY_PORT;
use crate::protocol::{self, ChannelFrame, CHANNEL};
use crate::relay::{Relay, RelayError};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Relay channel all events are published on
    pub channel: String,
    /// Per-subscriber buffer of the local relay
    pub broadcast_capacity: usize,
    /// Advertised to subscribers in `pusher:connection_established`
    pub activity_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{GATEWAY_PORT}"),
            channel: CHANNEL.to_string(),
            broadcast_capacity: 256,
            activity_timeout_secs: 120,
        }
    }
}

/// Gateway statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayStats {
    pub events_relayed: u64,
    pub relay_failures: u64,
    pub total_connections: u64,
    pub active_connections: u64,
}

#[derive(Default)]
struct Counters {
    events_relayed: AtomicU64,
    relay_failures: AtomicU64,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
}

/// Errors surfaced by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::Relay(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
struct GatewayState {
    config: Arc<GatewayConfig>,
    relay: Arc<dyn Relay>,
    /// Set when subscribers connect to this process directly.
    local: Option<Arc<LocalRelay>>,
    counters: Arc<Counters>,
}

impl GatewayState {
    async fn relay(&self, event: BoardEvent) -> Result<(), GatewayError> {
        match self.relay.trigger(&self.config.channel, &event).await {
            Ok(receivers) => {
                self.counters.events_relayed.fetch_add(1, Ordering::Relaxed);
                match receivers {
                    Some(n) => log::debug!(
                        "Relayed {} via {} to {n} subscribers",
                        event.name(),
                        self.relay.name()
                    ),
                    None => log::debug!("Relayed {} via {}", event.name(), self.relay.name()),
                }
                Ok(())
            }
            Err(e) => {
                self.counters.relay_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("Failed to relay {} via {}: {e}", event.name(), self.relay.name());
                Err(e.into())
            }
        }
    }
}

/// The relay gateway.
pub struct RelayGateway {
    state: GatewayState,
}

impl RelayGateway {
    /// Gateway publishing through `relay`.
    pub fn new(config: GatewayConfig, relay: Arc<dyn Relay>) -> Self {
        Self {
            state: GatewayState {
                config: Arc::new(config),
                relay,
                local: None,
                counters: Arc::new(Counters::default()),
            },
        }
    }

    /// Gateway with an in-process relay; subscribers connect to `GET /events`.
    pub fn local(config: GatewayConfig) -> Self {
        let local = Arc::new(LocalRelay::new(config.broadcast_capacity));
        let relay: Arc<dyn Relay> = local.clone();
        let mut gateway = Self::new(config, relay);
        gateway.state.local = Some(local);
        gateway
    }

    /// Build the HTTP router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/update-note", post(update_note))
            .route("/create-note", post(create_note))
            .route("/update-log", post(update_log));
        if self.state.local.is_some() {
            router = router.route("/events", get(events));
        }
        router
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.state.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        log::info!(
            "Relay gateway listening on {addr} ({} relay, channel {})",
            self.state.relay.name(),
            self.state.config.channel
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        log::info!("Relay gateway on {addr} stopped");
        Ok(())
    }

    pub fn stats(&self) -> GatewayStats {
        let c = &self.state.counters;
        GatewayStats {
            events_relayed: c.events_relayed.load(Ordering::Relaxed),
            relay_failures: c.relay_failures.load(Ordering::Relaxed),
            total_connections: c.total_connections.load(Ordering::Relaxed),
            active_connections: c.active_connections.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// The in-process relay, if this gateway runs one.
    pub fn local_relay(&self) -> Option<&Arc<LocalRelay>> {
        self.state.local.as_ref()
    }
}

async fn update_note(
    State(state): State<GatewayState>,
    Json(payload): Json<NoteMoved>,
) -> Result<&'static str, GatewayError> {
    state.relay(payload.into()).await?;
    Ok("Event triggered")
}

async fn create_note(
    State(state): State<GatewayState>,
    Json(payload): Json<NoteCreated>,
) -> Result<&'static str, GatewayError> {
    state.relay(payload.into()).await?;
    Ok("Note created")
}

async fn update_log(
    State(state): State<GatewayState>,
    Json(payload): Json<LogUpdated>,
) -> Result<&'static str, GatewayError> {
    state.relay(payload.into()).await?;
    Ok("Log synchronized")
}

async fn events(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    let Some(local) = state.local.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    ws.on_upgrade(move |socket| handle_subscriber(socket, local, state))
}

/// Socket ids look like the hosted broker's: two dot-separated integers.
fn new_socket_id() -> String {
    let n = Uuid::new_v4().as_u128();
    format!(
        "{}.{}",
        (n >> 64) as u64 % 1_000_000_000,
        n as u64 % 1_000_000_000
    )
}

async fn send_frame(out: &mpsc::Sender<String>, frame: ChannelFrame) {
    match frame.encode() {
        Ok(text) => {
            let _ = out.send(text).await;
        }
        Err(e) => log::error!("Failed to encode {} frame: {e}", frame.event),
    }
}

fn spawn_forwarder(
    mut rx: broadcast::Receiver<Arc<String>>,
    out: mpsc::Sender<String>,
    socket_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(text) => {
                    if out.send(text.as_ref().clone()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Subscriber {socket_id} lagged, {n} frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Handle one subscriber connection on the local relay.
async fn handle_subscriber(socket: WebSocket, local: Arc<LocalRelay>, state: GatewayState) {
    let socket_id = new_socket_id();
    let counters = state.counters.clone();
    counters.total_connections.fetch_add(1, Ordering::Relaxed);
    counters.active_connections.fetch_add(1, Ordering::Relaxed);
    log::info!("Subscriber {socket_id} connected");

    let (mut sink, mut stream) = socket.split();

    // Writer task: control replies and forwarded broadcasts share one sink.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(state.config.broadcast_capacity.max(1));
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    send_frame(
        &out_tx,
        ChannelFrame::connection_established(&socket_id, state.config.activity_timeout_secs),
    )
    .await;

    let mut subscriptions: Vec<(String, JoinHandle<()>)> = Vec::new();

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::debug!("Subscriber {socket_id} read error: {e}");
                break;
            }
        };

        let frame = match ChannelFrame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Subscriber {socket_id} sent an invalid frame: {e}");
                continue;
            }
        };

        match frame.event.as_str() {
            protocol::SUBSCRIBE => {
                let Some(channel) = frame.subscribe_channel() else {
                    send_frame(&out_tx, ChannelFrame::error(4009, "missing channel")).await;
                    continue;
                };
                if !subscriptions.iter().any(|(c, _)| *c == channel) {
                    let rx = local.rooms().join(&channel, &socket_id).await;
                    let task = spawn_forwarder(rx, out_tx.clone(), socket_id.clone());
                    subscriptions.push((channel.clone(), task));
                    log::debug!("Subscriber {socket_id} joined {channel}");
                }
                send_frame(&out_tx, ChannelFrame::subscription_succeeded(&channel)).await;
            }
            protocol::PING => send_frame(&out_tx, ChannelFrame::pong()).await,
            other => log::trace!("Ignoring {other} from subscriber {socket_id}"),
        }
    }

    for (channel, task) in subscriptions {
        task.abort();
        local.rooms().leave(&channel, &socket_id).await;
    }
    drop(out_tx);
    writer.abort();

    counters.active_connections.fetch_sub(1, Ordering::Relaxed);
    log::info!("Subscriber {socket_id} disconnected");
}
