//! Destinations for outbound messages.
//!
//! A destination is either a chat channel or a whisper recipient. Every
//! identifier entering the system passes through [`normalize_identity`] so
//! that `#Foo`, `foo` and ` FOO ` all name the same account.

use std::fmt;
use thiserror::Error;

/// Maximum length of a normalized destination name.
pub const MAX_DESTINATION_NAME_LENGTH: usize = 64;

/// Destination validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    /// Name is empty after normalization.
    #[error("Destination name cannot be empty")]
    Empty,

    /// Name exceeds [`MAX_DESTINATION_NAME_LENGTH`].
    #[error("Destination name too long: {0} bytes")]
    TooLong(usize),

    /// Name contains whitespace or control characters.
    #[error("Destination name contains invalid characters: {0:?}")]
    InvalidCharacters(String),
}

/// Normalize a user, viewer or channel identifier.
///
/// Trims surrounding whitespace, strips a single leading `#` or `@` and
/// lowercases ASCII letters.
#[must_use]
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix('@'))
        .unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

/// Validate an already-normalized name.
///
/// # Errors
///
/// Returns an error if the name is empty, too long, or contains whitespace
/// or control characters.
pub fn validate_name(name: &str) -> Result<(), DestinationError> {
    if name.is_empty() {
        return Err(DestinationError::Empty);
    }
    if name.len() > MAX_DESTINATION_NAME_LENGTH {
        return Err(DestinationError::TooLong(name.len()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DestinationError::InvalidCharacters(name.to_string()));
    }
    Ok(())
}

/// Kind of destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DestinationKind {
    /// A chat channel.
    Channel,
    /// A whisper recipient.
    Whisper,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Channel => f.write_str("channel"),
            DestinationKind::Whisper => f.write_str("whisper"),
        }
    }
}

/// Where an outbound message is sent.
///
/// Two destinations are equal iff their kind and normalized name match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    kind: DestinationKind,
    name: String,
}

impl Destination {
    /// Create a channel destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized name is invalid.
    pub fn channel(name: &str) -> Result<Self, DestinationError> {
        Self::new(DestinationKind::Channel, name)
    }

    /// Create a whisper destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized name is invalid.
    pub fn whisper(recipient: &str) -> Result<Self, DestinationError> {
        Self::new(DestinationKind::Whisper, recipient)
    }

    /// Create a destination of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized name is invalid.
    pub fn new(kind: DestinationKind, name: &str) -> Result<Self, DestinationError> {
        let name = normalize_identity(name);
        validate_name(&name)?;
        Ok(Self { kind, name })
    }

    /// Destination kind.
    #[must_use]
    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// Normalized name, without any `#` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as the chat network expects it (`#name` for channels).
    #[must_use]
    pub fn target(&self) -> String {
        match self.kind {
            DestinationKind::Channel => format!("#{}", self.name),
            DestinationKind::Whisper => self.name.clone(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DestinationKind::Channel => write!(f, "#{}", self.name),
            DestinationKind::Whisper => write!(f, "whisper:{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity() {
        assert_eq!(normalize_identity("#SomeChannel"), "somechannel");
        assert_eq!(normalize_identity("  @Alice "), "alice");
        assert_eq!(normalize_identity("bob"), "bob");
        // Only one prefix character is stripped
        assert_eq!(normalize_identity("##odd"), "#odd");
    }

    #[test]
    fn test_destination_equality_is_case_folded() {
        let a = Destination::channel("#Test").unwrap();
        let b = Destination::channel("test").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.target(), "#test");
    }

    #[test]
    fn test_channel_and_whisper_are_distinct() {
        let channel = Destination::channel("alice").unwrap();
        let whisper = Destination::whisper("alice").unwrap();
        assert_ne!(channel, whisper);
        assert_eq!(whisper.target(), "alice");
        assert_eq!(whisper.to_string(), "whisper:alice");
    }

    #[test]
    fn test_destination_validation() {
        assert_eq!(Destination::channel("#"), Err(DestinationError::Empty));
        assert!(matches!(
            Destination::whisper("two words"),
            Err(DestinationError::InvalidCharacters(_))
        ));

        let long_name = "a".repeat(MAX_DESTINATION_NAME_LENGTH + 1);
        assert!(matches!(
            Destination::channel(&long_name),
            Err(DestinationError::TooLong(_))
        ));
    }
}
