//! Typed inbound chat events.
//!
//! Raw IRC lines are classified into a closed set of event variants. All
//! user and channel names are normalized on the way in, so later stages can
//! compare identities with plain equality.

use herald_core::normalize_identity;
use serde::{Deserialize, Serialize};

use crate::irc::IrcMessage;

/// An inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEvent {
    /// A chat line in a channel.
    Chat {
        /// Normalized channel name, without `#`.
        channel: String,
        /// Normalized login of the speaker.
        user: String,
        /// Message text.
        body: String,
        /// Whether the speaker is the bot itself.
        #[serde(default)]
        is_self: bool,
    },

    /// A `/me` action line in a channel.
    Action {
        /// Normalized channel name, without `#`.
        channel: String,
        /// Normalized login of the speaker.
        user: String,
        /// Action text, without the CTCP framing.
        body: String,
        /// Whether the speaker is the bot itself.
        #[serde(default)]
        is_self: bool,
    },

    /// A private whisper to the bot.
    Whisper {
        /// Normalized login of the sender.
        user: String,
        /// Whisper text.
        body: String,
        /// Whether the sender is the bot itself.
        #[serde(default)]
        is_self: bool,
    },

    /// A user joined a channel.
    Join {
        /// Normalized channel name, without `#`.
        channel: String,
        /// Normalized login of the user.
        user: String,
        /// Whether the user is the bot itself.
        #[serde(default)]
        is_self: bool,
    },
}

impl InboundEvent {
    /// Classify a parsed IRC line.
    ///
    /// Returns `None` for commands that carry no chat event (PING, numerics,
    /// USERSTATE and so on) or that lack a sender.
    #[must_use]
    pub fn from_irc(message: &IrcMessage, bot_username: &str) -> Option<Self> {
        let user = normalize_identity(message.nick()?);
        let is_self = user == normalize_identity(bot_username);

        match message.command.as_str() {
            "PRIVMSG" => {
                let channel = normalize_identity(message.param(0)?);
                let text = message.param(1).unwrap_or_default();
                match parse_action(text) {
                    Some(body) => Some(InboundEvent::Action {
                        channel,
                        user,
                        body: body.to_string(),
                        is_self,
                    }),
                    None => Some(InboundEvent::Chat {
                        channel,
                        user,
                        body: text.to_string(),
                        is_self,
                    }),
                }
            }
            "WHISPER" => Some(InboundEvent::Whisper {
                user,
                body: message.param(1).unwrap_or_default().to_string(),
                is_self,
            }),
            "JOIN" => Some(InboundEvent::Join {
                channel: normalize_identity(message.param(0)?),
                user,
                is_self,
            }),
            _ => None,
        }
    }

    /// Normalized login of the acting user.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            InboundEvent::Chat { user, .. }
            | InboundEvent::Action { user, .. }
            | InboundEvent::Whisper { user, .. }
            | InboundEvent::Join { user, .. } => user,
        }
    }

    /// Whether the transport flagged this event as the bot's own.
    #[must_use]
    pub fn is_self(&self) -> bool {
        match self {
            InboundEvent::Chat { is_self, .. }
            | InboundEvent::Action { is_self, .. }
            | InboundEvent::Whisper { is_self, .. }
            | InboundEvent::Join { is_self, .. } => *is_self,
        }
    }

    /// Variant name, for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Chat { .. } => "chat",
            InboundEvent::Action { .. } => "action",
            InboundEvent::Whisper { .. } => "whisper",
            InboundEvent::Join { .. } => "join",
        }
    }
}

/// Extract the text of a CTCP ACTION (`\x01ACTION text\x01`).
fn parse_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("\u{1}ACTION")?;
    let inner = inner.strip_suffix('\u{1}').unwrap_or(inner);
    Some(inner.strip_prefix(' ').unwrap_or(inner))
}
