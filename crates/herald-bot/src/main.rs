//! # Herald
//!
//! Rate-limited Twitch chat bot.
//!
//! ## Usage
//!
//! ```bash
//! # Run with ./herald.toml or a default path
//! herald
//!
//! # Run with a specific config file
//! HERALD_CONFIG=/path/to/herald.toml herald
//!
//! # Override settings from the environment
//! HERALD_CHANNELS=lobby,games HERALD_DISPATCH__CHAT_COOLDOWN_MS=5000 herald
//!
//! # Try it without a connection; type raw IRC lines on stdin
//! HERALD_IDENTITY__USERNAME=herald HERALD_CONNECTION__DRY_RUN=true herald
//! ```

mod commands;
mod config;
mod context;
mod dispatcher;
mod health;
mod metrics;
mod roster;
mod runtime;
mod store;
mod welcome;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info,herald_core=info,herald_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting Herald as {} in {:?}",
        config.identity.username,
        config.channels
    );

    runtime::run(config).await
}
