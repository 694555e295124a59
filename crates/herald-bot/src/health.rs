//! Health endpoint.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::context::BotContext;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Destinations with a queue.
    pub destinations: usize,
    /// Messages accepted but not yet sent.
    pub queued_messages: usize,
    /// Messages delivered.
    pub sent_messages: u64,
    /// Send attempts that failed.
    pub failed_messages: u64,
    /// Viewers waiting for a welcome.
    pub pending_viewers: usize,
    /// Viewers already welcomed.
    pub welcomed_viewers: usize,
}

impl HealthReport {
    /// Snapshot the bot state.
    #[must_use]
    pub fn collect(ctx: &BotContext) -> Self {
        let queues = ctx.registry().stats();
        let arrivals = ctx.arrivals().stats();
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            destinations: queues.destination_count,
            queued_messages: queues.pending,
            sent_messages: queues.sent,
            failed_messages: queues.failed,
            pending_viewers: arrivals.pending,
            welcomed_viewers: arrivals.welcomed,
        }
    }
}

/// Build the HTTP router.
pub fn router(ctx: Arc<BotContext>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(ctx)
}

/// Serve the health endpoint until the listener fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, ctx: Arc<BotContext>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Health endpoint listening on http://{}/health", addr);

    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

async fn health_handler(State(ctx): State<Arc<BotContext>>) -> impl IntoResponse {
    Json(HealthReport::collect(&ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandTable;
    use herald_core::RegistryConfig;
    use herald_transport::RecordingSender;

    #[tokio::test]
    async fn test_report_reflects_state() {
        let ctx = BotContext::with_parts(
            "herald",
            Arc::new(RecordingSender::new()),
            RegistryConfig::default(),
            CommandTable::default(),
        );
        ctx.registry().prepare(["lobby", "games"]).unwrap();
        ctx.arrivals().record_arrival("alice");
        ctx.arrivals().seed(["bob", "carol"]);

        let report = HealthReport::collect(&ctx);
        assert_eq!(report.status, "ok");
        assert_eq!(report.destinations, 2);
        assert_eq!(report.pending_viewers, 1);
        assert_eq!(report.welcomed_viewers, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["destinations"], 2);
        assert_eq!(json["queued_messages"], 0);
        assert_eq!(json["pending_viewers"], 1);
        assert_eq!(json["welcomed_viewers"], 2);
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
