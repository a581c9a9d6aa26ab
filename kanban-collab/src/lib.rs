//! # kanban-collab — Real-time relay layer for the kanban board
//!
//! Moves board events between clients through a publish/subscribe relay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   POST /create-note    ┌──────────────┐   trigger   ┌─────────────┐
//! │ BoardClient │ ─────────────────────► │ RelayGateway │ ──────────► │    Relay    │
//! │ (per user)  │                        │  (stateless) │             │ Pusher/local│
//! └──────▲──────┘                        └──────────────┘             └──────┬──────┘
//!        │                                                                   │
//!        │                 WebSocket (Pusher protocol subset)                │
//!        └───────────────────────── Subscription ◄──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON channel frames spoken by subscribers
//! - [`relay`] — the `Relay` trait every backend implements
//! - [`broadcast`] — in-process fan-out and the local relay
//! - [`pusher`] — hosted broker relay (signed HTTP trigger)
//! - [`server`] — the relay gateway HTTP surface
//! - [`client`] — gateway client, subscription and board client
//! - [`config`] — credentials from the environment

pub mod broadcast;
pub mod client;
pub mod config;
pub mod protocol;
pub mod pusher;
pub mod relay;
pub mod server;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, LocalRelay, RoomManager};
pub use client::{
    BoardClient, ClientError, ConnectionState, GatewayClient, Subscription, SubscriptionConfig,
    SubscriptionEvent,
};
pub use config::{ConfigError, RelayCredentials, SubscriberCredentials, GATEWAY_PORT};
pub use protocol::{ChannelFrame, ProtocolError, CHANNEL};
pub use pusher::PusherRelay;
pub use relay::{Relay, RelayError};
pub use server::{GatewayConfig, GatewayError, GatewayStats, RelayGateway};
