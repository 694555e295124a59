//! Inbound event dispatch.
//!
//! Every event from the chat connection passes through
//! [`EventDispatcher::handle`]. Command replies are handed to the outbound
//! queues and joins are recorded with the arrival tracker. Handling never
//! waits on the network, so a slow destination cannot stall the read loop.

use herald_core::{ArrivalOutcome, Destination, MessageError, OutboundMessage, QueueError};
use herald_protocol::InboundEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::commands::{Origin, Reply};
use crate::config::ReplyRoute;
use crate::context::BotContext;
use crate::metrics;

/// Reasons a reply could not be queued.
#[derive(Debug, Error)]
pub enum ReplyError {
    /// The reply could not be addressed.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The destination queue refused the reply.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// What handling an event did.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A reply was queued for the destination.
    Replied(Destination),
    /// A reply matched but could not be queued.
    ReplyFailed(ReplyError),
    /// A join was recorded.
    Arrival(ArrivalOutcome),
    /// The event came from the bot itself.
    IgnoredSelf,
    /// Nothing to do.
    Ignored,
}

/// Routes inbound events.
#[derive(Clone)]
pub struct EventDispatcher {
    ctx: Arc<BotContext>,
}

impl EventDispatcher {
    /// Create a dispatcher over shared bot state.
    #[must_use]
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    /// Handle one event.
    pub fn handle(&self, event: InboundEvent) -> DispatchOutcome {
        metrics::record_inbound(event.kind());

        if event.is_self() || event.user() == self.ctx.bot_identity() {
            trace!(kind = event.kind(), "Ignoring own event");
            return DispatchOutcome::IgnoredSelf;
        }

        match event {
            InboundEvent::Chat {
                channel,
                user,
                body,
                ..
            } => {
                let origin = Origin::Chat { channel: &channel };
                match self.ctx.commands().reply(&body, &user, origin) {
                    Some(reply) => self.send_reply(reply, &channel, &user),
                    None => DispatchOutcome::Ignored,
                }
            }
            InboundEvent::Whisper { user, body, .. } => {
                match self.ctx.commands().reply(&body, &user, Origin::Whisper) {
                    Some(reply) => self.send_reply(reply, "", &user),
                    None => DispatchOutcome::Ignored,
                }
            }
            InboundEvent::Join { channel, user, .. } => {
                let outcome = self.ctx.arrivals().record_arrival(&user);
                metrics::record_arrival(arrival_label(outcome));
                if outcome.is_new() {
                    debug!(channel = %channel, viewer = %user, "Viewer arrived");
                }
                DispatchOutcome::Arrival(outcome)
            }
            InboundEvent::Action { .. } => DispatchOutcome::Ignored,
        }
    }

    fn send_reply(&self, reply: Reply, channel: &str, user: &str) -> DispatchOutcome {
        let message = match reply.route {
            ReplyRoute::Chat => OutboundMessage::chat(channel, reply.text),
            ReplyRoute::Action => OutboundMessage::action(channel, reply.text),
            ReplyRoute::Whisper => OutboundMessage::whisper(user, reply.text),
        };

        let result = message.map_err(ReplyError::from).and_then(|message| {
            let destination = message.destination().clone();
            self.ctx.enqueue(message)?;
            Ok(destination)
        });

        match result {
            Ok(destination) => {
                debug!(destination = %destination, user = %user, "Queued command reply");
                DispatchOutcome::Replied(destination)
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Failed to queue command reply");
                DispatchOutcome::ReplyFailed(e)
            }
        }
    }

    /// Handle events until the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<InboundEvent>) {
        info!("Event dispatcher started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        info!("Event dispatcher stopped");
    }
}

fn arrival_label(outcome: ArrivalOutcome) -> &'static str {
    match outcome {
        ArrivalOutcome::New => "new",
        ArrivalOutcome::AlreadyPending => "already_pending",
        ArrivalOutcome::InFlight => "in_flight",
        ArrivalOutcome::AlreadyWelcomed => "already_welcomed",
        ArrivalOutcome::SelfIgnored => "self",
        ArrivalOutcome::Invalid => "invalid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandTable;
    use crate::config::{default_commands, CommandConfig, CommandSource};
    use herald_core::{MessageKind, RegistryConfig};
    use herald_transport::RecordingSender;
    use std::time::Duration;

    fn setup(commands: Vec<CommandConfig>) -> (EventDispatcher, Arc<RecordingSender>) {
        let recorder = Arc::new(RecordingSender::new());
        let ctx = BotContext::with_parts(
            "herald",
            recorder.clone(),
            RegistryConfig::default(),
            CommandTable::new(commands),
        );
        (EventDispatcher::new(Arc::new(ctx)), recorder)
    }

    fn chat(channel: &str, user: &str, body: &str) -> InboundEvent {
        InboundEvent::Chat {
            channel: channel.into(),
            user: user.into(),
            body: body.into(),
            is_self: false,
        }
    }

    fn join(user: &str, is_self: bool) -> InboundEvent {
        InboundEvent::Join {
            channel: "test".into(),
            user: user.into(),
            is_self,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_kappa_in_chat_is_whispered() {
        let (dispatcher, recorder) = setup(default_commands());

        let outcome = dispatcher.handle(chat("test", "alice", "!kappa"));
        assert!(matches!(
            outcome,
            DispatchOutcome::Replied(ref d) if *d == Destination::whisper("alice").unwrap()
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Whisper);
        assert_eq!(sent[0].body, "Kappa");
        assert!(recorder
            .sent_to(&Destination::channel("test").unwrap())
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_whispered_command_replies_by_whisper() {
        let (dispatcher, recorder) = setup(vec![CommandConfig {
            trigger: "!ping".into(),
            reply: "pong".into(),
            route: ReplyRoute::Chat,
            source: CommandSource::Any,
        }]);

        dispatcher.handle(InboundEvent::Whisper {
            user: "bob".into(),
            body: "!ping".into(),
            is_self: false,
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, Destination::whisper("bob").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_command_is_ignored() {
        let (dispatcher, recorder) = setup(default_commands());

        assert!(matches!(
            dispatcher.handle(chat("test", "alice", "hello there")),
            DispatchOutcome::Ignored
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn test_self_events_ignored() {
        let (dispatcher, recorder) = setup(default_commands());

        assert!(matches!(
            dispatcher.handle(join("herald", true)),
            DispatchOutcome::IgnoredSelf
        ));
        assert!(matches!(
            dispatcher.handle(chat("test", "herald", "!kappa")),
            DispatchOutcome::IgnoredSelf
        ));

        let stats = dispatcher.ctx.arrivals().stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.welcomed, 0);
        assert!(recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn test_join_records_arrival_once() {
        let (dispatcher, _recorder) = setup(default_commands());

        assert!(matches!(
            dispatcher.handle(join("alice", false)),
            DispatchOutcome::Arrival(ArrivalOutcome::New)
        ));
        assert!(matches!(
            dispatcher.handle(join("alice", false)),
            DispatchOutcome::Arrival(ArrivalOutcome::AlreadyPending)
        ));
        assert_eq!(dispatcher.ctx.arrivals().pending_viewers(), ["alice"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_channel() {
        let (dispatcher, recorder) = setup(default_commands());
        let (tx, rx) = mpsc::channel(8);

        tx.send(chat("test", "alice", "!kappa")).await.unwrap();
        tx.send(join("bob", false)).await.unwrap();
        drop(tx);

        let ctx = dispatcher.ctx.clone();
        dispatcher.run(rx).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(recorder.sent().len(), 1);
        assert_eq!(ctx.arrivals().pending_viewers(), ["bob"]);
    }
}
