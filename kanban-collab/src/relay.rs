//! The publish side of the pub/sub relay.
//!
//! The gateway only ever calls [`Relay::trigger`]. Delivery to subscribers is
//! the relay's business: the hosted broker ([`crate::pusher::PusherRelay`])
//! or the in-process fan-out ([`crate::broadcast::LocalRelay`]).

use async_trait::async_trait;

use kanban_core::BoardEvent;

/// Errors from a broadcast attempt.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay request failed: {0}")]
    Transport(String),
    #[error("relay rejected the event ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("could not sign relay request: {0}")]
    Signing(String),
    #[error("could not encode event: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}

/// Something that can publish a board event to every subscriber of a channel.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Publish `event` on `channel`.
    ///
    /// Returns the number of subscribers the event was handed to, when the
    /// backend knows it.
    async fn trigger(&self, channel: &str, event: &BoardEvent) -> Result<Option<usize>, RelayError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
