//! Outbound message types for Herald.

use crate::destination::{Destination, DestinationError, DestinationKind};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::time::Instant;

/// A unique message identifier.
pub type MessageId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// How the message is presented by the chat network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A plain chat line.
    Chat,
    /// A `/me` action line.
    Action,
    /// A private whisper.
    Whisper,
}

impl MessageKind {
    /// Destination kind this message kind can be sent to.
    #[must_use]
    pub fn destination_kind(self) -> DestinationKind {
        match self {
            MessageKind::Chat | MessageKind::Action => DestinationKind::Channel,
            MessageKind::Whisper => DestinationKind::Whisper,
        }
    }

    /// Metric label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Action => "action",
            MessageKind::Whisper => "whisper",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors building an outbound message.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Invalid destination.
    #[error(transparent)]
    Destination(#[from] DestinationError),

    /// Body is empty after trimming.
    #[error("Message body cannot be empty")]
    EmptyBody,

    /// Kind cannot be delivered to this destination.
    #[error("Cannot send {kind} message to {destination}")]
    KindMismatch {
        /// Requested message kind.
        kind: MessageKind,
        /// Offending destination.
        destination: Destination,
    },
}

/// An outbound message. Immutable once built.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    id: MessageId,
    destination: Destination,
    body: String,
    kind: MessageKind,
    created_at: Instant,
}

impl OutboundMessage {
    /// Create a message for an existing destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is blank or the kind does not match the
    /// destination kind.
    pub fn new(
        destination: Destination,
        body: impl Into<String>,
        kind: MessageKind,
    ) -> Result<Self, MessageError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(MessageError::EmptyBody);
        }
        if kind.destination_kind() != destination.kind() {
            return Err(MessageError::KindMismatch { kind, destination });
        }
        Ok(Self {
            id: generate_message_id(),
            destination,
            body,
            kind,
            created_at: Instant::now(),
        })
    }

    /// Create a chat line for a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name or body is invalid.
    pub fn chat(channel: &str, body: impl Into<String>) -> Result<Self, MessageError> {
        Self::new(Destination::channel(channel)?, body, MessageKind::Chat)
    }

    /// Create an action line for a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name or body is invalid.
    pub fn action(channel: &str, body: impl Into<String>) -> Result<Self, MessageError> {
        Self::new(Destination::channel(channel)?, body, MessageKind::Action)
    }

    /// Create a whisper for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipient or body is invalid.
    pub fn whisper(recipient: &str, body: impl Into<String>) -> Result<Self, MessageError> {
        Self::new(Destination::whisper(recipient)?, body, MessageKind::Whisper)
    }

    /// Message ID.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Target destination.
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Message body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// When the message was built.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}
