//! Destination registry.
//!
//! The registry is the single authority mapping a destination to its
//! [`CooldownQueue`]. Queues are created lazily on first use and live for
//! the lifetime of the registry.

use crate::destination::{Destination, DestinationError, DestinationKind};
use crate::message::OutboundMessage;
use crate::queue::{
    CooldownQueue, QueueConfig, QueueError, QueueStats, DEFAULT_COOLDOWN, DEFAULT_MAX_BACKLOG,
};
use crate::sender::{log_failures, FailureHandler, Sender};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Cooldown for channel destinations.
    pub chat_cooldown: Duration,
    /// Cooldown for whisper destinations.
    pub whisper_cooldown: Duration,
    /// Backlog capacity per destination.
    pub max_backlog: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            chat_cooldown: DEFAULT_COOLDOWN,
            whisper_cooldown: DEFAULT_COOLDOWN,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }
}

impl RegistryConfig {
    /// Queue configuration for a destination kind.
    #[must_use]
    pub fn queue_config(&self, kind: DestinationKind) -> QueueConfig {
        let cooldown = match kind {
            DestinationKind::Channel => self.chat_cooldown,
            DestinationKind::Whisper => self.whisper_cooldown,
        };
        QueueConfig {
            cooldown,
            max_backlog: self.max_backlog,
        }
    }
}

/// Maps destinations to their cooldown queues.
pub struct DestinationRegistry {
    queues: DashMap<Destination, Arc<CooldownQueue>>,
    sender: Arc<dyn Sender>,
    on_failure: FailureHandler,
    config: RegistryConfig,
}

impl DestinationRegistry {
    /// Create a registry whose send failures are logged.
    #[must_use]
    pub fn new(sender: Arc<dyn Sender>, config: RegistryConfig) -> Self {
        Self::with_failure_handler(sender, config, log_failures())
    }

    /// Create a registry with a custom failure handler.
    #[must_use]
    pub fn with_failure_handler(
        sender: Arc<dyn Sender>,
        config: RegistryConfig,
        on_failure: FailureHandler,
    ) -> Self {
        info!("Creating destination registry with config: {:?}", config);
        Self {
            queues: DashMap::new(),
            sender,
            on_failure,
            config,
        }
    }

    /// Get the queue for a destination, creating it if absent.
    ///
    /// Creation happens under the map's entry lock, so concurrent callers
    /// always observe the same queue instance.
    ///
    /// # Panics
    ///
    /// Creating a queue panics if called outside of a Tokio runtime.
    pub fn resolve(&self, destination: &Destination) -> Arc<CooldownQueue> {
        if let Some(queue) = self.queues.get(destination) {
            return Arc::clone(queue.value());
        }

        let entry = self
            .queues
            .entry(destination.clone())
            .or_insert_with(|| {
                debug!(destination = %destination, "Creating queue for new destination");
                Arc::new(CooldownQueue::spawn(
                    destination.clone(),
                    self.config.queue_config(destination.kind()),
                    Arc::clone(&self.sender),
                    Arc::clone(&self.on_failure),
                ))
            });
        Arc::clone(entry.value())
    }

    /// Resolve a channel by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name is invalid.
    pub fn resolve_channel(&self, channel: &str) -> Result<Arc<CooldownQueue>, DestinationError> {
        Ok(self.resolve(&Destination::channel(channel)?))
    }

    /// Resolve a whisper recipient by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipient name is invalid.
    pub fn resolve_whisper(&self, recipient: &str) -> Result<Arc<CooldownQueue>, DestinationError> {
        Ok(self.resolve(&Destination::whisper(recipient)?))
    }

    /// Enqueue a message on its destination's queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue rejects the message.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<(), QueueError> {
        self.resolve(message.destination()).enqueue(message)
    }

    /// Create queues for the initial set of channels.
    ///
    /// # Errors
    ///
    /// Returns an error on the first invalid channel name.
    pub fn prepare<I, S>(&self, channels: I) -> Result<usize, DestinationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut count = 0;
        for channel in channels {
            self.resolve_channel(channel.as_ref())?;
            count += 1;
        }
        Ok(count)
    }

    /// Check whether a queue exists for a destination.
    #[must_use]
    pub fn contains(&self, destination: &Destination) -> bool {
        self.queues.contains_key(destination)
    }

    /// All known destinations, sorted.
    #[must_use]
    pub fn destinations(&self) -> Vec<Destination> {
        let mut destinations: Vec<_> = self.queues.iter().map(|e| e.key().clone()).collect();
        destinations.sort();
        destinations
    }

    /// Registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Aggregate statistics over all queues.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.queues.iter() {
            let QueueStats {
                pending,
                sent,
                failed,
            } = entry.value().stats();
            stats.destination_count += 1;
            stats.pending += pending;
            stats.sent += sent;
            stats.failed += failed;
        }
        stats
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of destination queues.
    pub destination_count: usize,
    /// Messages waiting across all queues.
    pub pending: usize,
    /// Messages sent across all queues.
    pub sent: u64,
    /// Messages failed across all queues.
    pub failed: u64,
}
