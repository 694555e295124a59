//! The boundary between the dispatch queues and the chat transport.

use crate::message::OutboundMessage;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by a [`Sender`].
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The underlying connection is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The transport rejected or failed to write the message.
    #[error("Send failed: {0}")]
    Failed(String),
}

/// Performs the actual network send for one message.
///
/// Implementations may take arbitrarily long; the cooldown queue awaits the
/// result before scheduling the next message for the same destination.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Deliver a message to its destination.
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError>;
}

#[async_trait]
impl<S: Sender + ?Sized> Sender for Arc<S> {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        (**self).send(message).await
    }
}

/// Callback invoked when a [`Sender`] reports a failure.
pub type FailureHandler = Arc<dyn Fn(&OutboundMessage, &SendError) + Send + Sync>;

/// A failure handler that only logs.
#[must_use]
pub fn log_failures() -> FailureHandler {
    Arc::new(|message, error| {
        tracing::warn!(
            destination = %message.destination(),
            message_id = message.id(),
            error = %error,
            "Dropping message after send failure"
        );
    })
}
