//! Bot configuration.
//!
//! Configuration is layered:
//! - TOML configuration file (`HERALD_CONFIG`, or the first default path found)
//! - Environment variables (`HERALD_<SECTION>__<KEY>`, e.g.
//!   `HERALD_DISPATCH__CHAT_COOLDOWN_MS=5000`, `HERALD_CHANNELS=a,b`)

use anyhow::{bail, Context, Result};
use herald_core::{Destination, RegistryConfig};
use herald_transport::{ChatClientConfig, DEFAULT_CHAT_URL};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::welcome;

/// Paths searched when `HERALD_CONFIG` is not set.
const CONFIG_PATHS: [&str; 3] = [
    "herald.toml",
    "/etc/herald/herald.toml",
    "~/.config/herald/herald.toml",
];

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Channels to join and prepare queues for.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Bot identity.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Chat connection.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Outbound dispatch limits.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Viewer welcomes.
    #[serde(default)]
    pub welcome: WelcomeConfig,

    /// Canned command replies.
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandConfig>,

    /// Viewer list persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Startup roster fetch.
    #[serde(default)]
    pub roster: RosterConfig,

    /// Health endpoint.
    #[serde(default)]
    pub health: HealthConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Bot identity.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Bot login.
    #[serde(default)]
    pub username: String,

    /// OAuth token for the chat login.
    #[serde(default)]
    pub oauth_token: String,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("username", &self.username)
            .field("oauth_token", &"<redacted>")
            .finish()
    }
}

/// Chat connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket URL of the chat server.
    #[serde(default = "default_chat_url")]
    pub url: String,

    /// Log outbound lines instead of connecting.
    #[serde(default)]
    pub dry_run: bool,

    /// Capacity of the inbound event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Outbound dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Minimum interval between two messages to the same channel.
    #[serde(default = "default_cooldown")]
    pub chat_cooldown_ms: u64,

    /// Minimum interval between two whispers to the same user.
    #[serde(default = "default_cooldown")]
    pub whisper_cooldown_ms: u64,

    /// Maximum messages waiting per destination.
    #[serde(default = "default_max_backlog")]
    pub max_backlog: usize,
}

/// Viewer welcome configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeConfig {
    /// Enable welcome passes.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between welcome passes in milliseconds.
    #[serde(default = "default_welcome_interval")]
    pub interval_ms: u64,

    /// Channel to welcome in. Defaults to the first configured channel.
    #[serde(default)]
    pub channel: Option<String>,

    /// Welcome line; `{viewers}` is replaced by the greeted names.
    #[serde(default = "default_welcome_template")]
    pub template: String,
}

/// Where a command reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyRoute {
    /// Chat line in the originating channel.
    #[default]
    Chat,
    /// `/me` line in the originating channel.
    Action,
    /// Whisper to the speaker.
    Whisper,
}

/// Which inbound events a command listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    /// Channel chat only.
    Chat,
    /// Whispers only.
    Whisper,
    /// Both.
    #[default]
    Any,
}

/// A canned command reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Exact message body that triggers the command.
    pub trigger: String,

    /// Reply template; supports `{user}` and `{channel}`.
    pub reply: String,

    /// Where the reply goes.
    #[serde(default)]
    pub route: ReplyRoute,

    /// Which events trigger the command.
    #[serde(default)]
    pub source: CommandSource,
}

/// Viewer list persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding welcomed viewers. Empty disables persistence.
    #[serde(default = "default_viewers_file")]
    pub viewers_file: String,
}

/// Roster fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Seed welcomed viewers from the channel roster at startup.
    #[serde(default)]
    pub enabled: bool,

    /// Roster URL prefix; the channel and `/chatters` are appended.
    #[serde(default = "default_roster_url")]
    pub base_url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_roster_timeout")]
    pub timeout_ms: u64,
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Serve `GET /health`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_health_port")]
    pub port: u16,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_chat_url() -> String {
    DEFAULT_CHAT_URL.to_string()
}

fn default_event_buffer() -> usize {
    1024
}

fn default_cooldown() -> u64 {
    3000
}

fn default_max_backlog() -> usize {
    512
}

fn default_true() -> bool {
    true
}

fn default_welcome_interval() -> u64 {
    30_000
}

fn default_welcome_template() -> String {
    "Welcome {viewers}!".to_string()
}

fn default_viewers_file() -> String {
    "chatters.json".to_string()
}

fn default_roster_url() -> String {
    "http://tmi.twitch.tv/group/user/".to_string()
}

fn default_roster_timeout() -> u64 {
    5000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_health_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

pub(crate) fn default_commands() -> Vec<CommandConfig> {
    vec![
        CommandConfig {
            trigger: "!kappa".to_string(),
            reply: "Kappa".to_string(),
            route: ReplyRoute::Whisper,
            source: CommandSource::Any,
        },
        CommandConfig {
            trigger: "!help".to_string(),
            reply: "@{user} try !kappa".to_string(),
            route: ReplyRoute::Chat,
            source: CommandSource::Chat,
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            identity: IdentityConfig::default(),
            connection: ConnectionConfig::default(),
            dispatch: DispatchConfig::default(),
            welcome: WelcomeConfig::default(),
            commands: default_commands(),
            storage: StorageConfig::default(),
            roster: RosterConfig::default(),
            health: HealthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            dry_run: false,
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chat_cooldown_ms: default_cooldown(),
            whisper_cooldown_ms: default_cooldown(),
            max_backlog: default_max_backlog(),
        }
    }
}

impl Default for WelcomeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_welcome_interval(),
            channel: None,
            template: default_welcome_template(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            viewers_file: default_viewers_file(),
        }
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_roster_url(),
            timeout_ms: default_roster_timeout(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_health_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the configured or default file, then the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        let path = std::env::var("HERALD_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                CONFIG_PATHS
                    .iter()
                    .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
                    .find(|p| p.exists())
            });

        Self::from_sources(path.as_deref())
    }

    /// Load configuration from an optional file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn from_sources(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("HERALD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("channels"),
        );

        let config: Config = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.identity.username.trim().is_empty() {
            bail!("identity.username must be set");
        }
        if !self.connection.dry_run && self.identity.oauth_token.trim().is_empty() {
            bail!("identity.oauth_token must be set unless connection.dry_run is enabled");
        }
        for channel in &self.channels {
            Destination::channel(channel)
                .with_context(|| format!("Invalid channel name: {channel:?}"))?;
        }
        if let Some(channel) = &self.welcome.channel {
            Destination::channel(channel)
                .with_context(|| format!("Invalid welcome channel: {channel:?}"))?;
        }
        if self.dispatch.max_backlog == 0 {
            bail!("dispatch.max_backlog must be greater than zero");
        }
        if self.connection.event_buffer == 0 {
            bail!("connection.event_buffer must be greater than zero");
        }
        if self.welcome.enabled && self.welcome.interval_ms == 0 {
            bail!("welcome.interval_ms must be greater than zero");
        }
        if self.welcome.enabled && !welcome::template_fits(&self.welcome.template) {
            bail!(
                "welcome.template leaves no room for names within {} bytes",
                welcome::MAX_WELCOME_LINE
            );
        }
        if let Some(command) = self.commands.iter().find(|c| c.trigger.trim().is_empty()) {
            bail!("Command with reply {:?} has an empty trigger", command.reply);
        }
        Ok(())
    }

    /// Registry settings derived from the dispatch section.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            chat_cooldown: Duration::from_millis(self.dispatch.chat_cooldown_ms),
            whisper_cooldown: Duration::from_millis(self.dispatch.whisper_cooldown_ms),
            max_backlog: self.dispatch.max_backlog,
        }
    }

    /// Chat client settings.
    #[must_use]
    pub fn chat_client_config(&self) -> ChatClientConfig {
        ChatClientConfig {
            url: self.connection.url.clone(),
            username: self.identity.username.clone(),
            oauth_token: self.identity.oauth_token.clone(),
            channels: self.channels.clone(),
        }
    }

    /// Channel welcomes are sent to, if any.
    #[must_use]
    pub fn welcome_channel(&self) -> Option<&str> {
        self.welcome
            .channel
            .as_deref()
            .or_else(|| self.channels.first().map(String::as_str))
    }

    /// Interval between welcome passes.
    #[must_use]
    pub fn welcome_interval(&self) -> Duration {
        Duration::from_millis(self.welcome.interval_ms)
    }

    /// Socket address of the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn health_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.health.host, self.health.port)
            .parse()
            .with_context(|| format!("Invalid health address {}:{}", self.health.host, self.health.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, PoisonError};

    fn valid() -> Config {
        let mut config = Config::default();
        config.identity.username = "herald".to_string();
        config.connection.dry_run = true;
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dispatch.chat_cooldown_ms, 3000);
        assert_eq!(config.dispatch.max_backlog, 512);
        assert!(config.welcome.enabled);
        assert!(!config.roster.enabled);
        assert_eq!(config.commands[0].trigger, "!kappa");
        assert_eq!(config.commands[0].route, ReplyRoute::Whisper);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r##"
            channels = ["#Lobby", "games"]

            [identity]
            username = "Herald"
            oauth_token = "oauth:secret"

            [dispatch]
            chat_cooldown_ms = 1500

            [[commands]]
            trigger = "!hi"
            reply = "hi {user}"
            route = "action"
            source = "chat"
        "##;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.channels, ["#Lobby", "games"]);
        assert_eq!(config.dispatch.chat_cooldown_ms, 1500);
        assert_eq!(config.dispatch.whisper_cooldown_ms, 3000);
        assert_eq!(config.commands.len(), 1);
        assert_eq!(config.commands[0].route, ReplyRoute::Action);
        assert_eq!(config.welcome_channel(), Some("#Lobby"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.identity.username = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.connection.dry_run = false;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.channels = vec!["bad channel".to_string()];
        assert!(config.validate().is_err());

        let mut config = valid();
        config.dispatch.max_backlog = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.welcome.template = format!("{} {{viewers}}", "x".repeat(480));
        assert!(config.validate().is_err());
        config.welcome.enabled = false;
        assert!(config.validate().is_ok());
    }

    // Tests that read the process environment run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_from_sources_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "channels = [\"lobby\"]\n[identity]\nusername = \"herald\"\n[connection]\ndry_run = true"
        )
        .unwrap();

        let config = Config::from_sources(Some(file.path())).unwrap();
        assert!(config.connection.dry_run);
        assert_eq!(config.channels, ["lobby"]);
        assert_eq!(config.registry_config().chat_cooldown, Duration::from_secs(3));
    }

    #[test]
    fn test_from_sources_environment() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let vars = [
            ("HERALD_IDENTITY__USERNAME", "herald"),
            ("HERALD_CONNECTION__DRY_RUN", "true"),
            ("HERALD_DISPATCH__CHAT_COOLDOWN_MS", "5000"),
            ("HERALD_CHANNELS", "lobby,games"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let result = Config::from_sources(None);
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = result.unwrap();
        assert_eq!(config.identity.username, "herald");
        assert!(config.connection.dry_run);
        assert_eq!(config.dispatch.chat_cooldown_ms, 5000);
        assert_eq!(config.dispatch.whisper_cooldown_ms, 3000);
        assert_eq!(config.channels, ["lobby", "games"]);
    }

    #[test]
    fn test_identity_debug_redacts_token() {
        let mut config = valid();
        config.identity.oauth_token = "oauth:secret".to_string();
        assert!(!format!("{:?}", config.identity).contains("secret"));
    }

    #[test]
    fn test_health_addr() {
        let config = valid();
        assert_eq!(config.health_addr().unwrap().port(), 8080);
    }
}
