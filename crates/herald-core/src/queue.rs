//! Per-destination cooldown queue.
//!
//! Each queue owns a bounded FIFO backlog and a scheduler task. The scheduler
//! releases at most one message per cooldown interval to the [`Sender`],
//! strictly in enqueue order. Queues for different destinations run as
//! independent tasks and never wait on each other.

use crate::destination::Destination;
use crate::message::OutboundMessage;
use crate::sender::{FailureHandler, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

/// Default per-message cooldown.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(3000);

/// Default backlog capacity per destination.
pub const DEFAULT_MAX_BACKLOG: usize = 512;

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backlog is at capacity. The message was not accepted.
    #[error("Backlog full for {destination} ({capacity} pending)")]
    BacklogFull {
        /// Destination whose backlog is full.
        destination: Destination,
        /// Configured capacity.
        capacity: usize,
    },

    /// Message addressed to another destination.
    #[error("Message for {actual} enqueued on queue for {expected}")]
    WrongDestination {
        /// Destination of this queue.
        expected: Destination,
        /// Destination of the message.
        actual: Destination,
    },

    /// Scheduler task has stopped.
    #[error("Queue for {0} is closed")]
    Closed(Destination),
}

/// Cooldown queue configuration.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Minimum interval between two sends.
    pub cooldown: Duration,
    /// Maximum number of messages waiting to be sent.
    pub max_backlog: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    pending: AtomicUsize,
    sent: AtomicU64,
    failed: AtomicU64,
}

/// Queue statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages accepted but not yet attempted (including one in flight).
    pub pending: usize,
    /// Messages the sender accepted.
    pub sent: u64,
    /// Messages the sender rejected.
    pub failed: u64,
}

/// A rate-limited FIFO for one destination.
pub struct CooldownQueue {
    destination: Destination,
    config: QueueConfig,
    tx: mpsc::Sender<OutboundMessage>,
    counters: Arc<QueueCounters>,
}

impl CooldownQueue {
    /// Create a queue and spawn its scheduler task.
    ///
    /// The scheduler stops once the queue is dropped and its backlog is
    /// drained.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn spawn(
        destination: Destination,
        config: QueueConfig,
        sender: Arc<dyn Sender>,
        on_failure: FailureHandler,
    ) -> Self {
        let capacity = config.max_backlog.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(QueueCounters::default());

        let scheduler = Scheduler {
            destination: destination.clone(),
            cooldown: config.cooldown,
            rx,
            sender,
            on_failure,
            counters: Arc::clone(&counters),
            last_send: None,
        };
        tokio::spawn(scheduler.run());

        debug!(destination = %destination, cooldown_ms = config.cooldown.as_millis() as u64, "Created cooldown queue");

        Self {
            destination,
            config: QueueConfig {
                max_backlog: capacity,
                ..config
            },
            tx,
            counters,
        }
    }

    /// Accept a message for eventual delivery. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the backlog is full, the message belongs to a
    /// different destination, or the scheduler has stopped.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<(), QueueError> {
        if message.destination() != &self.destination {
            return Err(QueueError::WrongDestination {
                expected: self.destination.clone(),
                actual: message.destination().clone(),
            });
        }

        // Count before handing off so the scheduler never decrements first.
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        let id = message.id();
        match self.tx.try_send(message) {
            Ok(()) => {
                trace!(destination = %self.destination, message_id = id, "Enqueued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                Err(QueueError::BacklogFull {
                    destination: self.destination.clone(),
                    capacity: self.config.max_backlog,
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                Err(QueueError::Closed(self.destination.clone()))
            }
        }
    }

    /// Destination served by this queue.
    #[must_use]
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Configured cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.config.cooldown
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.counters.pending.load(Ordering::SeqCst),
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Whether nothing is waiting or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.counters.pending.load(Ordering::SeqCst) == 0
    }
}

impl std::fmt::Debug for CooldownQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownQueue")
            .field("destination", &self.destination)
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// The delivery loop for one queue.
struct Scheduler {
    destination: Destination,
    cooldown: Duration,
    rx: mpsc::Receiver<OutboundMessage>,
    sender: Arc<dyn Sender>,
    on_failure: FailureHandler,
    counters: Arc<QueueCounters>,
    last_send: Option<Instant>,
}

impl Scheduler {
    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            if let Some(last) = self.last_send {
                let ready_at = last + self.cooldown;
                if ready_at > Instant::now() {
                    trace!(
                        destination = %self.destination,
                        wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                        "Waiting for cooldown"
                    );
                    sleep_until(ready_at).await;
                }
            }

            let result = self.sender.send(&message).await;
            // A failed attempt still counts against the cooldown.
            self.last_send = Some(Instant::now());
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(()) => {
                    self.counters.sent.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        destination = %self.destination,
                        message_id = message.id(),
                        queued_ms = message.created_at().elapsed().as_millis() as u64,
                        "Sent"
                    );
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    (self.on_failure)(&message, &e);
                }
            }
        }

        debug!(destination = %self.destination, "Cooldown queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::SendError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Instant)>>,
        fail_bodies: Vec<&'static str>,
    }

    #[async_trait]
    impl Sender for Recorder {
        async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((message.body().to_string(), Instant::now()));
            if self.fail_bodies.contains(&message.body()) {
                return Err(SendError::Failed("rejected".into()));
            }
            Ok(())
        }
    }

    fn config(cooldown_ms: u64) -> QueueConfig {
        QueueConfig {
            cooldown: Duration::from_millis(cooldown_ms),
            max_backlog: 16,
        }
    }

    fn noop_failures() -> FailureHandler {
        Arc::new(|_, _| {})
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_message_waits_for_cooldown() {
        let recorder = Arc::new(Recorder::default());
        let dest = Destination::channel("test").unwrap();
        let queue = CooldownQueue::spawn(dest, config(3000), recorder.clone(), noop_failures());

        let start = Instant::now();
        queue.enqueue(OutboundMessage::chat("test", "A").unwrap()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.enqueue(OutboundMessage::chat("test", "B").unwrap()).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "A");
        assert_eq!(sent[1].0, "B");
        assert!(sent[0].1 - start < Duration::from_millis(50));
        assert!(sent[1].1 - sent[0].1 >= Duration::from_millis(3000));
        assert!(sent[1].1 - start < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_and_spacing() {
        let recorder = Arc::new(Recorder::default());
        let dest = Destination::channel("test").unwrap();
        let queue = CooldownQueue::spawn(dest, config(1000), recorder.clone(), noop_failures());

        for i in 0..5 {
            queue
                .enqueue(OutboundMessage::chat("test", format!("m{i}")).unwrap())
                .unwrap();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        let sent = recorder.sent.lock().unwrap();
        let bodies: Vec<_> = sent.iter().map(|(b, _)| b.as_str()).collect();
        assert_eq!(bodies, ["m0", "m1", "m2", "m3", "m4"]);
        for pair in sent.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(1000));
        }
        assert_eq!(queue.stats().sent, 5);
        assert!(queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reported_and_queue_advances() {
        let recorder = Arc::new(Recorder {
            fail_bodies: vec!["bad"],
            ..Default::default()
        });
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failures);
        let on_failure: FailureHandler = Arc::new(move |message, _| {
            sink.lock().unwrap().push(message.body().to_string());
        });

        let dest = Destination::whisper("alice").unwrap();
        let queue = CooldownQueue::spawn(dest, config(500), recorder.clone(), on_failure);

        queue.enqueue(OutboundMessage::whisper("alice", "bad").unwrap()).unwrap();
        queue.enqueue(OutboundMessage::whisper("alice", "good").unwrap()).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*failures.lock().unwrap(), ["bad"]);
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1 - sent[0].1 >= Duration::from_millis(500));

        let stats = queue.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backlog_full_is_rejected() {
        let recorder = Arc::new(Recorder::default());
        let dest = Destination::channel("test").unwrap();
        let queue = CooldownQueue::spawn(
            dest,
            QueueConfig {
                cooldown: Duration::from_secs(60),
                max_backlog: 2,
            },
            recorder,
            noop_failures(),
        );

        // The first message is picked up immediately, the next two fill the backlog.
        queue.enqueue(OutboundMessage::chat("test", "1").unwrap()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        queue.enqueue(OutboundMessage::chat("test", "2").unwrap()).unwrap();
        queue.enqueue(OutboundMessage::chat("test", "3").unwrap()).unwrap();

        assert!(matches!(
            queue.enqueue(OutboundMessage::chat("test", "4").unwrap()),
            Err(QueueError::BacklogFull { capacity: 2, .. })
        ));
        assert_eq!(queue.stats().pending, 2);
    }

    #[tokio::test]
    async fn test_wrong_destination_rejected() {
        let recorder = Arc::new(Recorder::default());
        let dest = Destination::channel("test").unwrap();
        let queue = CooldownQueue::spawn(dest, config(10), recorder, noop_failures());

        assert!(matches!(
            queue.enqueue(OutboundMessage::chat("other", "hi").unwrap()),
            Err(QueueError::WrongDestination { .. })
        ));
    }
}
