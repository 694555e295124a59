//! Canned command replies.

use crate::config::{CommandConfig, CommandSource, ReplyRoute};

/// Where an inbound command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin<'a> {
    /// A chat line in a channel.
    Chat {
        /// Normalized channel name.
        channel: &'a str,
    },
    /// A whisper to the bot.
    Whisper,
}

/// A rendered reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Where the reply goes.
    pub route: ReplyRoute,
    /// Reply text.
    pub text: String,
}

/// Lookup table from trigger text to reply.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: Vec<CommandConfig>,
}

impl CommandTable {
    /// Build a table. Earlier entries win on duplicate triggers.
    #[must_use]
    pub fn new(commands: Vec<CommandConfig>) -> Self {
        Self { commands }
    }

    /// Number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Match a message body and render the reply.
    ///
    /// The body must equal a trigger exactly, ignoring surrounding
    /// whitespace. Replies to whispers are always whispered back, since a
    /// whisper has no channel to answer in.
    #[must_use]
    pub fn reply(&self, body: &str, user: &str, origin: Origin<'_>) -> Option<Reply> {
        let body = body.trim();
        let command = self.commands.iter().find(|c| {
            c.trigger == body
                && match (c.source, origin) {
                    (CommandSource::Any, _) => true,
                    (CommandSource::Chat, Origin::Chat { .. }) => true,
                    (CommandSource::Whisper, Origin::Whisper) => true,
                    _ => false,
                }
        })?;

        let (route, channel) = match origin {
            Origin::Chat { channel } => (command.route, channel),
            Origin::Whisper => (ReplyRoute::Whisper, ""),
        };

        Some(Reply {
            route,
            text: command
                .reply
                .replace("{user}", user)
                .replace("{channel}", channel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CommandTable {
        CommandTable::new(vec![
            CommandConfig {
                trigger: "!kappa".into(),
                reply: "Kappa".into(),
                route: ReplyRoute::Whisper,
                source: CommandSource::Any,
            },
            CommandConfig {
                trigger: "!hello".into(),
                reply: "Hello {user}, welcome to #{channel}".into(),
                route: ReplyRoute::Chat,
                source: CommandSource::Chat,
            },
        ])
    }

    #[test]
    fn test_exact_match_only() {
        let table = table();
        let origin = Origin::Chat { channel: "lobby" };

        assert!(table.reply("!kappa", "alice", origin).is_some());
        assert!(table.reply("  !kappa ", "alice", origin).is_some());
        assert!(table.reply("!kappa please", "alice", origin).is_none());
        assert!(table.reply("!KAPPA", "alice", origin).is_none());
        assert!(table.reply("hello", "alice", origin).is_none());
    }

    #[test]
    fn test_template_rendering() {
        let reply = table()
            .reply("!hello", "alice", Origin::Chat { channel: "lobby" })
            .unwrap();
        assert_eq!(reply.route, ReplyRoute::Chat);
        assert_eq!(reply.text, "Hello alice, welcome to #lobby");
    }

    #[test]
    fn test_source_filtering() {
        let table = table();
        assert!(table.reply("!hello", "alice", Origin::Whisper).is_none());

        let reply = table.reply("!kappa", "alice", Origin::Whisper).unwrap();
        assert_eq!(reply.route, ReplyRoute::Whisper);
    }
}
