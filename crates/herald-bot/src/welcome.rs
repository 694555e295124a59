//! Periodic viewer welcomes.
//!
//! Each pass drains the arrival tracker, packs the names into as few chat
//! lines as fit, and queues them on the welcome channel. Viewers whose line
//! was accepted are committed; the rest go back to the front of the pending
//! set for the next pass.

use herald_core::destination::MAX_DESTINATION_NAME_LENGTH;
use herald_core::{Destination, MessageKind, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::context::BotContext;
use crate::metrics;
use crate::store::ViewerStore;

/// Longest chat line the welcome pass will produce.
pub const MAX_WELCOME_LINE: usize = 500;

const PLACEHOLDER: &str = "{viewers}";

/// A rendered welcome line and the number of viewers it greets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeLine {
    /// Line text.
    pub text: String,
    /// Number of leading viewers covered.
    pub count: usize,
}

/// Whether a template leaves room for at least one name of maximum length
/// in every placeholder.
#[must_use]
pub fn template_fits(template: &str) -> bool {
    let placeholders = template.matches(PLACEHOLDER).count();
    let overhead = template.len() - placeholders * PLACEHOLDER.len();
    overhead + placeholders * MAX_DESTINATION_NAME_LENGTH <= MAX_WELCOME_LINE
}

/// Pack viewers into welcome lines of at most [`MAX_WELCOME_LINE`] bytes.
///
/// A template without `{viewers}` yields a single line covering everyone.
/// Every placeholder receives the same list. A line always holds at least
/// one name, so only a template rejected by [`template_fits`] can exceed
/// the limit.
#[must_use]
pub fn compose(template: &str, viewers: &[String]) -> Vec<WelcomeLine> {
    if viewers.is_empty() {
        return Vec::new();
    }
    let placeholders = template.matches(PLACEHOLDER).count();
    if placeholders == 0 {
        return vec![WelcomeLine {
            text: template.to_string(),
            count: viewers.len(),
        }];
    }

    let overhead = template.len() - placeholders * PLACEHOLDER.len();
    let mut lines = Vec::new();
    let mut names = String::new();
    let mut count = 0;

    for viewer in viewers {
        let extra = if count == 0 { viewer.len() } else { viewer.len() + 2 };
        if count > 0 && overhead + placeholders * (names.len() + extra) > MAX_WELCOME_LINE {
            lines.push(WelcomeLine {
                text: template.replace(PLACEHOLDER, &names),
                count,
            });
            names.clear();
            count = 0;
        }
        if count > 0 {
            names.push_str(", ");
        }
        names.push_str(viewer);
        count += 1;
    }

    lines.push(WelcomeLine {
        text: template.replace(PLACEHOLDER, &names),
        count,
    });
    lines
}

/// Result of one welcome pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WelcomeReport {
    /// Viewers whose welcome was queued.
    pub welcomed: usize,
    /// Viewers returned to pending.
    pub restored: usize,
}

/// Runs welcome passes on an interval.
pub struct WelcomeConsumer {
    ctx: Arc<BotContext>,
    channel: Destination,
    template: String,
    interval: Duration,
    store: Option<ViewerStore>,
}

impl WelcomeConsumer {
    /// Create a consumer greeting in `channel`.
    #[must_use]
    pub fn new(
        ctx: Arc<BotContext>,
        channel: Destination,
        template: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            ctx,
            channel,
            template: template.into(),
            interval,
            store: None,
        }
    }

    /// Persist the welcomed list after every pass that greets someone.
    #[must_use]
    pub fn with_store(mut self, store: ViewerStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Run a single pass.
    pub async fn run_once(&self) -> WelcomeReport {
        let arrivals = self.ctx.arrivals();
        let mut remaining = arrivals.drain_pending();
        if remaining.is_empty() {
            return WelcomeReport::default();
        }

        let lines = compose(&self.template, remaining.viewers());
        let mut report = WelcomeReport::default();

        for line in lines {
            let (covered, rest) = remaining.split_at(line.count);
            let accepted = OutboundMessage::new(self.channel.clone(), line.text, MessageKind::Chat)
                .map_err(|e| warn!(error = %e, "Invalid welcome line"))
                .and_then(|message| self.ctx.enqueue(message).map_err(|_| ()));

            match accepted {
                Ok(()) => {
                    report.welcomed += arrivals.commit(covered);
                    remaining = rest;
                }
                Err(()) => {
                    report.restored = covered.len() + rest.len();
                    arrivals.restore(rest);
                    arrivals.restore(covered);
                    break;
                }
            }
        }

        if report.welcomed > 0 {
            metrics::record_welcomed(report.welcomed);
            info!(
                channel = %self.channel,
                welcomed = report.welcomed,
                restored = report.restored,
                "Welcome pass"
            );
            self.persist().await;
        }
        report
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let viewers = self.ctx.arrivals().welcomed_viewers();
        if let Err(e) = store.save(&viewers).await {
            warn!(error = %e, "Failed to persist welcomed viewers");
        }
    }

    /// Run passes forever.
    pub async fn run(self) {
        info!(
            channel = %self.channel,
            interval_ms = self.interval.as_millis() as u64,
            "Welcome consumer started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.run_once().await;
            debug!(?report, "Welcome pass finished");
        }
    }
}
