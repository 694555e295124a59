//! Bot startup and shutdown.

use anyhow::{Context, Result};
use herald_core::{Destination, Sender};
use herald_protocol::{InboundEvent, IrcMessage};
use herald_transport::{ChatConnection, LogSender};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::BotContext;
use crate::dispatcher::EventDispatcher;
use crate::health;
use crate::metrics::{self, MeteredSender};
use crate::roster::RosterClient;
use crate::store::ViewerStore;
use crate::welcome::WelcomeConsumer;

/// Run the bot until interrupted or the chat connection closes.
///
/// # Errors
///
/// Returns an error if the chat connection cannot be established or the
/// configured channels are invalid.
pub async fn run(config: Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let (events_tx, events_rx) = mpsc::channel(config.connection.event_buffer);

    let (sender, connection): (Arc<dyn Sender>, Option<ChatConnection>) =
        if config.connection.dry_run {
            info!("Dry run: outbound lines are logged, raw IRC lines are read from stdin");
            let bot = config.identity.username.clone();
            tokio::spawn(read_stdin_events(events_tx, bot));
            let sender: Arc<dyn Sender> = Arc::new(MeteredSender::new(LogSender));
            (sender, None)
        } else {
            let connection = ChatConnection::connect(config.chat_client_config(), events_tx)
                .await
                .context("Failed to connect to chat")?;
            let sender: Arc<dyn Sender> = Arc::new(MeteredSender::new(connection.sender()));
            (sender, Some(connection))
        };

    let ctx = Arc::new(BotContext::new(&config, sender));
    let prepared = ctx
        .registry()
        .prepare(&config.channels)
        .context("Invalid channel")?;
    metrics::set_active_destinations(prepared);

    let store = (!config.storage.viewers_file.is_empty())
        .then(|| ViewerStore::new(shellexpand::tilde(&config.storage.viewers_file).into_owned()));
    seed_viewers(&config, &ctx, store.as_ref()).await;

    tokio::spawn(EventDispatcher::new(Arc::clone(&ctx)).run(events_rx));

    if config.welcome.enabled {
        match config.welcome_channel().map(Destination::channel) {
            Some(Ok(channel)) => {
                let mut consumer = WelcomeConsumer::new(
                    Arc::clone(&ctx),
                    channel,
                    config.welcome.template.clone(),
                    config.welcome_interval(),
                );
                if let Some(store) = &store {
                    consumer = consumer.with_store(store.clone());
                }
                tokio::spawn(consumer.run());
            }
            Some(Err(e)) => warn!("Welcomes disabled, invalid channel: {}", e),
            None => warn!("Welcomes disabled, no channel configured"),
        }
    }

    if config.health.enabled {
        let addr = config.health_addr()?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = health::serve(addr, ctx).await {
                error!("Health endpoint failed: {:#}", e);
            }
        });
    }

    let closed = async {
        match connection {
            Some(connection) => connection.closed().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        }
        () = closed => {
            warn!("Chat connection closed, shutting down");
        }
    }

    if let Some(store) = &store {
        if let Err(e) = store.save(&ctx.arrivals().welcomed_viewers()).await {
            warn!("Failed to save viewer list: {}", e);
        }
    }

    let stats = ctx.registry().stats();
    info!(
        destinations = stats.destination_count,
        sent = stats.sent,
        failed = stats.failed,
        dropped = stats.pending,
        "Stopped"
    );
    Ok(())
}

/// Mark viewers already known from the store and the channel roster as
/// welcomed. Failures are logged and otherwise ignored.
async fn seed_viewers(config: &Config, ctx: &BotContext, store: Option<&ViewerStore>) {
    if let Some(store) = store {
        match store.load().await {
            Ok(viewers) => {
                let added = ctx.arrivals().seed(viewers);
                info!(path = %store.path().display(), count = added, "Loaded welcomed viewers");
            }
            Err(e) => warn!("Failed to load viewer list: {}", e),
        }
    }

    if !config.roster.enabled {
        return;
    }
    let client = match RosterClient::new(
        config.roster.base_url.clone(),
        Duration::from_millis(config.roster.timeout_ms),
    ) {
        Ok(client) => client,
        Err(e) => {
            warn!("Roster lookup unavailable: {}", e);
            return;
        }
    };

    for channel in &config.channels {
        match client.fetch(channel).await {
            Ok(chatters) => {
                let added = ctx.arrivals().seed(chatters.all());
                info!(channel = %channel, count = added, "Seeded viewers from roster");
            }
            Err(e) => warn!(channel = %channel, "Roster lookup failed: {}", e),
        }
    }
}

/// Feed raw IRC lines from stdin into the dispatcher.
async fn read_stdin_events(events: mpsc::Sender<InboundEvent>, bot_username: String) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match IrcMessage::parse(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed line: {}", e);
                continue;
            }
        };
        match InboundEvent::from_irc(&message, &bot_username) {
            Some(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            None => debug!(command = %message.command, "Line carries no chat event"),
        }
    }
    debug!("Stdin closed");
}
