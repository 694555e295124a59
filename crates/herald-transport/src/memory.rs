//! In-memory senders.
//!
//! [`RecordingSender`] keeps every delivered message for inspection and can
//! simulate slow or failing destinations. [`LogSender`] backs dry-run mode.

use async_trait::async_trait;
use herald_core::{Destination, MessageKind, OutboundMessage, SendError, Sender};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::outbound::to_command;

/// A message observed by a [`RecordingSender`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Destination of the message.
    pub destination: Destination,
    /// Message body.
    pub body: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Encoded wire line.
    pub line: String,
    /// When the send was attempted.
    pub at: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records sends instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<Destination>>,
    delay: Option<Duration>,
}

impl RecordingSender {
    /// Create a recorder that accepts everything immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send take `delay` before resolving.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every send to a destination.
    pub fn fail_destination(&self, destination: Destination) {
        lock(&self.failing).insert(destination);
    }

    /// All attempted sends in order, failed ones included.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    /// Attempted sends to one destination.
    #[must_use]
    pub fn sent_to(&self, destination: &Destination) -> Vec<SentMessage> {
        lock(&self.sent)
            .iter()
            .filter(|m| &m.destination == destination)
            .cloned()
            .collect()
    }

    /// Bodies of all attempted sends.
    #[must_use]
    pub fn bodies(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|m| m.body.clone()).collect()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        lock(&self.sent).push(SentMessage {
            destination: message.destination().clone(),
            body: message.body().to_string(),
            kind: message.kind(),
            line: to_command(message).encode(),
            at: Instant::now(),
        });

        if lock(&self.failing).contains(message.destination()) {
            return Err(SendError::Failed(format!(
                "{} is marked as failing",
                message.destination()
            )));
        }
        Ok(())
    }
}

/// Logs outbound lines instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let line = to_command(message).encode();
        info!(
            destination = %message.destination(),
            kind = %message.kind(),
            line = %line.trim_end(),
            "Dry run"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_sender() {
        let sender = RecordingSender::new();
        let message = OutboundMessage::chat("lobby", "hello").unwrap();

        sender.send(&message).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].line, "PRIVMSG #lobby :hello\r\n");
        assert_eq!(sender.bodies(), ["hello"]);
    }

    #[tokio::test]
    async fn test_failing_destination() {
        let sender = RecordingSender::new();
        let dest = Destination::whisper("alice").unwrap();
        sender.fail_destination(dest.clone());

        let message = OutboundMessage::whisper("alice", "hi").unwrap();
        assert!(sender.send(&message).await.is_err());
        assert_eq!(sender.sent_to(&dest).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay() {
        let sender = RecordingSender::new().with_delay(Duration::from_secs(2));
        let start = Instant::now();

        sender
            .send(&OutboundMessage::chat("lobby", "late").unwrap())
            .await
            .unwrap();

        assert!(sender.sent()[0].at - start >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_log_sender_accepts() {
        let message = OutboundMessage::action("lobby", "waves").unwrap();
        assert!(LogSender.send(&message).await.is_ok());
    }
}
