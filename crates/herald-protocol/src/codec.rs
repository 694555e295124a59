//! Streaming line codec for chat traffic.
//!
//! Chat servers deliver newline-terminated lines, possibly several per
//! transport frame and possibly split across frames. The codec buffers
//! partial input and yields one parsed [`IrcMessage`] per complete line.

use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::irc::IrcMessage;

/// Maximum accepted line length in bytes, tags included.
pub const MAX_LINE_LENGTH: usize = 8192;

/// Protocol errors that can occur during decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line exceeds [`MAX_LINE_LENGTH`].
    #[error("Line size {0} exceeds maximum {MAX_LINE_LENGTH}")]
    LineTooLong(usize),

    /// Line is not valid UTF-8.
    #[error("Invalid UTF-8 in line: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Line could not be parsed.
    #[error("Invalid line: {0}")]
    Invalid(String),
}

/// Try to decode one line from a buffer, advancing it if successful.
///
/// Blank lines are skipped. Returns `Ok(None)` if more data is needed.
///
/// # Errors
///
/// Returns an error if a line is too long, not UTF-8, or unparseable. The
/// offending line is consumed so decoding can continue afterwards.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<IrcMessage>, ProtocolError> {
    loop {
        let Some(newline) = buf.iter().position(|b| *b == b'\n') else {
            if buf.len() > MAX_LINE_LENGTH {
                let len = buf.len();
                buf.clear();
                return Err(ProtocolError::LineTooLong(len));
            }
            return Ok(None);
        };

        let line = buf.split_to(newline);
        buf.advance(1);

        if line.len() > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong(line.len()));
        }

        let text = std::str::from_utf8(&line)?.trim_end_matches('\r');
        if text.trim().is_empty() {
            continue;
        }
        return IrcMessage::parse(text).map(Some);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_decode_across_chunks() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b":a!a@a JOIN #chan\r\n:b!b@b PRIV");

        let first = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(first.command, "JOIN");
        assert!(decode_from(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"MSG #chan :hi\r\n");
        let second = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(second.command, "PRIVMSG");
        assert_eq!(second.param(1), Some("hi"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut buf = BytesMut::from(&b"\r\n\n  \r\nPING :x\n"[..]);
        let msg = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_line_too_long() {
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LENGTH + 1].as_slice());
        match decode_from(&mut buf) {
            Err(ProtocolError::LineTooLong(_)) => {}
            other => panic!("Expected LineTooLong error, got {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8_consumed() {
        let mut buf = BytesMut::from(&b"\xff\xfe\nPING :x\n"[..]);
        assert!(matches!(decode_from(&mut buf), Err(ProtocolError::Utf8(_))));
        assert!(decode_from(&mut buf).unwrap().is_some());
    }
}
