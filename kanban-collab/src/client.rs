//! Board client: the local replica, the gateway it publishes through, and the
//! subscription it receives echoes from.
//!
//! Provides:
//! - [`GatewayClient`]: HTTP calls to the relay gateway
//! - [`Subscription`]: a Pusher-protocol WebSocket subscriber
//! - [`BoardClient`]: optimistic local mutations plus remote reconciliation
//!
//! Local changes are applied first and then published. Nothing is retried;
//! a failed publish leaves the optimistic change in place and is reported to
//! the caller.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use kanban_core::{activity, Applied, BoardEvent, BoardState, EventError, Note, NoteId, Status};

use crate::config::GATEWAY_PORT;
use crate::protocol::{self, ChannelFrame, ProtocolError, CHANNEL};

/// Client-side errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid input: {0}")]
    Validation(#[from] EventError),
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected {endpoint} ({status}): {body}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
}

/// HTTP client for the relay gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    http: reqwest::Client,
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new(format!("http://localhost:{GATEWAY_PORT}"))
    }
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Gateway path that publishes `event`.
    pub fn endpoint(event: &BoardEvent) -> &'static str {
        match event {
            BoardEvent::NoteMoved(_) => "/update-note",
            BoardEvent::NoteCreated(_) => "/create-note",
            BoardEvent::LogUpdated(_) => "/update-log",
        }
    }

    /// Ask the gateway to broadcast `event`.
    pub async fn publish(&self, event: &BoardEvent) -> Result<(), ClientError> {
        let endpoint = Self::endpoint(event);
        let response = self
            .http
            .post(format!("{}{endpoint}", self.base_url))
            .json(&event.payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Subscription connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Events emitted by a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Handshake finished; the subscribe request has been sent.
    Connected { socket_id: String },
    /// The relay confirmed the channel subscription.
    Subscribed(String),
    /// A decoded board event.
    Board(BoardEvent),
    /// A frame that could not be decoded. It was skipped.
    Malformed(String),
    Disconnected,
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// WebSocket endpoint (local `/events` or the hosted broker URL)
    pub url: String,
    /// Channel to join
    pub channel: String,
    /// Buffered events before the reader applies backpressure
    pub event_buffer: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://localhost:{GATEWAY_PORT}/events"),
            channel: CHANNEL.to_string(),
            event_buffer: 256,
        }
    }
}

impl SubscriptionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// A live channel subscription.
///
/// Background tasks read and write the WebSocket; decoded events are handed
/// out through [`next_event`](Self::next_event). Protocol pings are answered
/// without involving the caller.
pub struct Subscription {
    state: Arc<RwLock<ConnectionState>>,
    events: mpsc::Receiver<SubscriptionEvent>,
    outgoing: mpsc::Sender<String>,
    tasks: Vec<JoinHandle<()>>,
}

/// Shared by the reader task while it dispatches frames.
struct FrameContext {
    channel: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing: mpsc::Sender<String>,
    events: mpsc::Sender<SubscriptionEvent>,
}

impl FrameContext {
    async fn reply(&self, frame: ChannelFrame) {
        match frame.encode() {
            Ok(text) => {
                let _ = self.outgoing.send(text).await;
            }
            Err(e) => log::error!("Failed to encode {} frame: {e}", frame.event),
        }
    }

    async fn emit(&self, event: SubscriptionEvent) {
        let _ = self.events.send(event).await;
    }

    async fn handle_text(&self, text: &str) {
        let frame = match ChannelFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping undecodable frame: {e}");
                self.emit(SubscriptionEvent::Malformed(e.to_string())).await;
                return;
            }
        };

        match frame.event.as_str() {
            protocol::CONNECTION_ESTABLISHED => {
                let socket_id = frame.socket_id().unwrap_or_default();
                *self.state.write().await = ConnectionState::Connected;
                log::info!("Connected to relay as {socket_id}");
                self.reply(ChannelFrame::subscribe(&self.channel)).await;
                self.emit(SubscriptionEvent::Connected { socket_id }).await;
            }
            protocol::SUBSCRIPTION_SUCCEEDED => {
                let channel = frame.channel.unwrap_or_else(|| self.channel.clone());
                log::debug!("Subscribed to {channel}");
                self.emit(SubscriptionEvent::Subscribed(channel)).await;
            }
            protocol::PING => self.reply(ChannelFrame::pong()).await,
            protocol::ERROR => log::warn!("Relay reported an error: {}", text),
            _ if frame.is_control() => log::trace!("Ignoring {}", frame.event),
            _ => {
                if frame.channel.as_deref() != Some(self.channel.as_str()) {
                    log::trace!("Ignoring {} on {:?}", frame.event, frame.channel);
                    return;
                }
                match frame.board_event_payload() {
                    Ok(Some(event)) => self.emit(SubscriptionEvent::Board(event)).await,
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("Skipping malformed {} event: {e}", frame.event);
                        self.emit(SubscriptionEvent::Malformed(e.to_string())).await;
                    }
                }
            }
        }
    }
}

impl Subscription {
    /// Connect and join `config.channel` once the relay greets us.
    pub async fn connect(config: SubscriptionConfig) -> Result<Self, ProtocolError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(config.url.as_str())
            .await
            .map_err(|e| ProtocolError::Connect(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));

        // Writer task: forward outgoing frames to the WebSocket
        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: decode frames and dispatch them
        let ctx = FrameContext {
            channel: config.channel,
            state: state.clone(),
            outgoing: out_tx.clone(),
            events: event_tx,
        };
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => ctx.handle_text(text.as_str()).await,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Subscription read error: {e}");
                        break;
                    }
                }
            }
            *ctx.state.write().await = ConnectionState::Disconnected;
            log::info!("Subscription closed");
            ctx.emit(SubscriptionEvent::Disconnected).await;
        });

        Ok(Self {
            state,
            events: event_rx,
            outgoing: out_tx,
            tasks: vec![writer, reader],
        })
    }

    /// Next event, or `None` once the connection is gone and drained.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Send a protocol ping.
    pub async fn ping(&self) -> Result<(), ProtocolError> {
        self.outgoing
            .send(ChannelFrame::ping().encode()?)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A board replica bound to a gateway.
pub struct BoardClient {
    board: BoardState,
    gateway: GatewayClient,
}

impl BoardClient {
    pub fn new(board: BoardState, gateway: GatewayClient) -> Self {
        Self { board, gateway }
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    async fn publish(&self, event: &BoardEvent) -> Result<(), ClientError> {
        self.gateway.publish(event).await.inspect_err(|e| {
            log::error!("Failed to publish {}: {e}", event.name());
        })
    }

    /// Create a note locally, then publish it and its log line.
    ///
    /// Both fields are required. The log line is only published once the
    /// note itself went out.
    pub async fn create_note(&mut self, title: &str, description: &str) -> Result<Note, ClientError> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(EventError::BlankField("title").into());
        }
        if description.is_empty() {
            return Err(EventError::BlankField("description").into());
        }

        let note = self.board.create_local(title, description);
        self.publish(&BoardEvent::note_created(&note)).await?;

        let line = activity::note_created(&note.title, activity::now());
        self.publish(&BoardEvent::log_updated(line)).await?;
        Ok(note)
    }

    /// Move a note locally, then publish the move and its log line.
    ///
    /// Returns the note as it was before the move, or `None` when nothing
    /// was published (unknown id or status unchanged).
    pub async fn move_note(&mut self, id: &NoteId, status: Status) -> Result<Option<Note>, ClientError> {
        let Some(previous) = self.board.move_local(id, status) else {
            log::warn!("Cannot move unknown note {id}");
            return Ok(None);
        };
        if previous.status == status {
            log::debug!("Note {id} already in {status}");
            return Ok(None);
        }

        self.publish(&BoardEvent::note_moved(id.clone(), status)).await?;

        let line = activity::note_moved(&previous.title, status, activity::now());
        self.publish(&BoardEvent::log_updated(line)).await?;
        Ok(Some(previous))
    }

    /// Merge an event received from the subscription.
    pub fn apply_remote(&mut self, event: &BoardEvent) -> Applied {
        self.board.apply(event)
    }
}
