//! Metrics collection and export for Herald.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use async_trait::async_trait;
use herald_core::{OutboundMessage, SendError, Sender};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// Metric names.
pub mod names {
    pub const INBOUND_EVENTS_TOTAL: &str = "herald_inbound_events_total";
    pub const MESSAGES_ENQUEUED_TOTAL: &str = "herald_messages_enqueued_total";
    pub const MESSAGES_REJECTED_TOTAL: &str = "herald_messages_rejected_total";
    pub const MESSAGES_SENT_TOTAL: &str = "herald_messages_sent_total";
    pub const MESSAGES_FAILED_TOTAL: &str = "herald_messages_failed_total";
    pub const SEND_LATENCY_SECONDS: &str = "herald_send_latency_seconds";
    pub const DESTINATIONS_ACTIVE: &str = "herald_destinations_active";
    pub const ARRIVALS_TOTAL: &str = "herald_arrivals_total";
    pub const VIEWERS_WELCOMED_TOTAL: &str = "herald_viewers_welcomed_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::INBOUND_EVENTS_TOTAL, "Inbound chat events by kind");
    metrics::describe_counter!(
        names::MESSAGES_ENQUEUED_TOTAL,
        "Outbound messages accepted by a cooldown queue"
    );
    metrics::describe_counter!(
        names::MESSAGES_REJECTED_TOTAL,
        "Outbound messages refused by a full or closed queue"
    );
    metrics::describe_counter!(names::MESSAGES_SENT_TOTAL, "Outbound messages delivered");
    metrics::describe_counter!(
        names::MESSAGES_FAILED_TOTAL,
        "Outbound messages the transport failed to deliver"
    );
    metrics::describe_histogram!(names::SEND_LATENCY_SECONDS, "Transport send latency in seconds");
    metrics::describe_gauge!(names::DESTINATIONS_ACTIVE, "Number of destination queues");
    metrics::describe_counter!(names::ARRIVALS_TOTAL, "Join events by tracker outcome");
    metrics::describe_counter!(names::VIEWERS_WELCOMED_TOTAL, "Viewers welcomed");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an inbound event.
pub fn record_inbound(kind: &'static str) {
    counter!(names::INBOUND_EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Record a message accepted by a queue.
pub fn record_enqueued(kind: &'static str) {
    counter!(names::MESSAGES_ENQUEUED_TOTAL, "kind" => kind).increment(1);
}

/// Record a message refused by a queue.
pub fn record_rejected(kind: &'static str) {
    counter!(names::MESSAGES_REJECTED_TOTAL, "kind" => kind).increment(1);
}

/// Record a join outcome.
pub fn record_arrival(outcome: &'static str) {
    counter!(names::ARRIVALS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record welcomed viewers.
pub fn record_welcomed(count: usize) {
    counter!(names::VIEWERS_WELCOMED_TOTAL).increment(count as u64);
}

/// Update the destination queue count.
pub fn set_active_destinations(count: usize) {
    gauge!(names::DESTINATIONS_ACTIVE).set(count as f64);
}

/// A [`Sender`] wrapper that records delivery metrics.
pub struct MeteredSender<S> {
    inner: S,
}

impl<S> MeteredSender<S> {
    /// Wrap a sender.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: Sender> Sender for MeteredSender<S> {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let start = Instant::now();
        let result = self.inner.send(message).await;
        histogram!(names::SEND_LATENCY_SECONDS).record(start.elapsed().as_secs_f64());

        let kind = message.kind().as_str();
        match &result {
            Ok(()) => counter!(names::MESSAGES_SENT_TOTAL, "kind" => kind).increment(1),
            Err(_) => counter!(names::MESSAGES_FAILED_TOTAL, "kind" => kind).increment(1),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::Destination;
    use herald_transport::RecordingSender;

    #[tokio::test]
    async fn test_metered_sender_passes_through() {
        let recorder = RecordingSender::new();
        recorder.fail_destination(Destination::whisper("bob").unwrap());
        let sender = MeteredSender::new(recorder);

        assert!(sender
            .send(&OutboundMessage::chat("lobby", "hi").unwrap())
            .await
            .is_ok());
        assert!(sender
            .send(&OutboundMessage::whisper("bob", "hi").unwrap())
            .await
            .is_err());
        assert_eq!(sender.inner.sent().len(), 2);
    }
}
