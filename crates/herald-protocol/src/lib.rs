//! # herald-protocol
//!
//! Wire format for the Twitch chat network as used by Herald.
//!
//! Twitch chat is IRC with IRCv3 message tags, carried over a WebSocket.
//! This crate parses inbound lines, classifies them into typed events and
//! renders outbound commands.
//!
//! ## Example
//!
//! ```rust
//! use herald_protocol::{Command, InboundEvent, IrcMessage};
//!
//! let line = ":alice!alice@alice.tmi.twitch.tv PRIVMSG #lobby :!kappa";
//! let message = IrcMessage::parse(line).unwrap();
//! let event = InboundEvent::from_irc(&message, "herald").unwrap();
//! assert_eq!(event.user(), "alice");
//!
//! let reply = Command::whisper("alice", "Kappa");
//! assert_eq!(reply.encode(), "PRIVMSG #jtv :/w alice Kappa\r\n");
//! ```

pub mod codec;
pub mod events;
pub mod irc;

pub use codec::{decode_from, ProtocolError, MAX_LINE_LENGTH};
pub use events::InboundEvent;
pub use irc::{Command, IrcMessage};
