//! Shared state handed to the dispatcher, the welcome consumer and the
//! health endpoint.

use herald_core::{
    normalize_identity, ArrivalTracker, DestinationRegistry, OutboundMessage, QueueError,
    RegistryConfig, Sender,
};
use std::sync::Arc;
use tracing::warn;

use crate::commands::CommandTable;
use crate::config::Config;
use crate::metrics;

/// Bot-wide state.
pub struct BotContext {
    bot_identity: String,
    registry: DestinationRegistry,
    arrivals: ArrivalTracker,
    commands: CommandTable,
}

impl BotContext {
    /// Build the context from configuration.
    #[must_use]
    pub fn new(config: &Config, sender: Arc<dyn Sender>) -> Self {
        Self::with_parts(
            &config.identity.username,
            sender,
            config.registry_config(),
            CommandTable::new(config.commands.clone()),
        )
    }

    /// Build the context from its parts.
    #[must_use]
    pub fn with_parts(
        username: &str,
        sender: Arc<dyn Sender>,
        registry_config: RegistryConfig,
        commands: CommandTable,
    ) -> Self {
        let bot_identity = normalize_identity(username);
        Self {
            registry: DestinationRegistry::new(sender, registry_config),
            arrivals: ArrivalTracker::new(&bot_identity),
            bot_identity,
            commands,
        }
    }

    /// Normalized bot login.
    #[must_use]
    pub fn bot_identity(&self) -> &str {
        &self.bot_identity
    }

    /// Outbound queues.
    #[must_use]
    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// Viewer arrivals.
    #[must_use]
    pub fn arrivals(&self) -> &ArrivalTracker {
        &self.arrivals
    }

    /// Command replies.
    #[must_use]
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Hand a message to its destination queue.
    ///
    /// # Errors
    ///
    /// Returns the queue's rejection, which is also logged.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<(), QueueError> {
        let kind = message.kind().as_str();
        let destination = message.destination().clone();

        match self.registry.enqueue(message) {
            Ok(()) => {
                metrics::record_enqueued(kind);
                metrics::set_active_destinations(self.registry.stats().destination_count);
                Ok(())
            }
            Err(e) => {
                metrics::record_rejected(kind);
                warn!(destination = %destination, error = %e, "Outbound message rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::Destination;
    use herald_transport::RecordingSender;

    #[tokio::test]
    async fn test_identity_is_normalized() {
        let ctx = BotContext::with_parts(
            "@Herald",
            Arc::new(RecordingSender::new()),
            RegistryConfig::default(),
            CommandTable::default(),
        );
        assert_eq!(ctx.bot_identity(), "herald");
        assert_eq!(ctx.arrivals().bot_identity(), "herald");
    }

    #[tokio::test]
    async fn test_enqueue_creates_queue() {
        let ctx = BotContext::with_parts(
            "herald",
            Arc::new(RecordingSender::new()),
            RegistryConfig::default(),
            CommandTable::default(),
        );

        ctx.enqueue(OutboundMessage::whisper("alice", "hi").unwrap())
            .unwrap();
        assert!(ctx
            .registry()
            .contains(&Destination::whisper("alice").unwrap()));
    }
}
