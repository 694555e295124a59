//! Mapping from outbound messages to wire commands.

use herald_core::{MessageKind, OutboundMessage};
use herald_protocol::Command;

/// Build the wire command that delivers a message.
#[must_use]
pub fn to_command(message: &OutboundMessage) -> Command {
    let destination = message.destination();
    match message.kind() {
        MessageKind::Chat => Command::chat(destination.target(), message.body()),
        MessageKind::Action => Command::action(destination.target(), message.body()),
        MessageKind::Whisper => Command::whisper(destination.name(), message.body()),
    }
}
