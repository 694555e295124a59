//! IRCv3 message parsing and outbound command encoding.
//!
//! Twitch chat speaks a dialect of IRC with message tags:
//!
//! ```text
//! @badge-info=;display-name=Alice :alice!alice@alice.tmi.twitch.tv PRIVMSG #chan :hello
//! ```

use crate::codec::ProtocolError;
use std::fmt::Write as _;

/// A parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcMessage {
    /// IRCv3 tags in wire order, values unescaped.
    pub tags: Vec<(String, String)>,
    /// Optional prefix without the leading `:`.
    pub prefix: Option<String>,
    /// Command, uppercased.
    pub command: String,
    /// Parameters; the trailing parameter is last.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line (without the line terminator).
    ///
    /// # Errors
    ///
    /// Returns an error if the line has no command.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut message = IrcMessage::default();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (tags, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            message.tags = tags
                .split(';')
                .filter(|t| !t.is_empty())
                .map(|tag| match tag.split_once('=') {
                    Some((key, value)) => (key.to_string(), unescape_tag_value(value)),
                    None => (tag.to_string(), String::new()),
                })
                .collect();
            rest = remainder.trim_start_matches(' ');
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, remainder) = stripped.split_once(' ').unwrap_or((stripped, ""));
            message.prefix = Some(prefix.to_string());
            rest = remainder.trim_start_matches(' ');
        }

        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ProtocolError::Invalid(format!("missing command: {line:?}")));
        }
        message.command = command.to_ascii_uppercase();

        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                message.params.push(trailing.to_string());
                break;
            }
            let (param, remainder) = rest.split_once(' ').unwrap_or((rest, ""));
            message.params.push(param.to_string());
            rest = remainder;
        }

        Ok(message)
    }

    /// Nickname part of the prefix (`nick!user@host`).
    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    /// Parameter by index.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// An outbound IRC command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request IRCv3 capabilities.
    CapReq(Vec<String>),
    /// Authenticate with an OAuth token.
    Pass(String),
    /// Set the nickname.
    Nick(String),
    /// Join a channel (`#name`).
    Join(String),
    /// Send text to a channel.
    Privmsg {
        /// Target (`#channel`).
        target: String,
        /// Text to send.
        text: String,
    },
    /// Reply to a server PING.
    Pong(String),
}

/// Channel that carries legacy `/w` whisper commands.
pub const WHISPER_CHANNEL: &str = "#jtv";

impl Command {
    /// A plain chat line.
    #[must_use]
    pub fn chat(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Command::Privmsg {
            target: channel.into(),
            text: text.into(),
        }
    }

    /// A `/me` action line, sent as CTCP ACTION.
    #[must_use]
    pub fn action(channel: impl Into<String>, text: &str) -> Self {
        Command::Privmsg {
            target: channel.into(),
            text: format!("\u{1}ACTION {text}\u{1}"),
        }
    }

    /// A whisper to a user.
    #[must_use]
    pub fn whisper(recipient: &str, text: &str) -> Self {
        Command::Privmsg {
            target: WHISPER_CHANNEL.to_string(),
            text: format!("/w {recipient} {text}"),
        }
    }

    /// Render as a `\r\n`-terminated line.
    ///
    /// Line breaks inside the text are replaced by spaces so a message can
    /// never inject a second command.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut line = String::new();
        // Writing to a String cannot fail.
        let _ = match self {
            Command::CapReq(caps) => write!(line, "CAP REQ :{}", caps.join(" ")),
            Command::Pass(token) => write!(line, "PASS {}", sanitize(token)),
            Command::Nick(nick) => write!(line, "NICK {}", sanitize(nick)),
            Command::Join(channel) => write!(line, "JOIN {}", sanitize(channel)),
            Command::Privmsg { target, text } => {
                write!(line, "PRIVMSG {} :{}", sanitize(target), sanitize(text))
            }
            Command::Pong(token) => write!(line, "PONG :{}", sanitize(token)),
        };
        line.push_str("\r\n");
        line
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
