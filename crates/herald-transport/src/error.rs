//! Transport errors.

use herald_core::SendError;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl From<TransportError> for SendError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::ConnectionClosed => SendError::ConnectionClosed,
            other => SendError::Failed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_send_error() {
        assert!(matches!(
            SendError::from(TransportError::ConnectionClosed),
            SendError::ConnectionClosed
        ));

        match SendError::from(TransportError::SendFailed("broken pipe".into())) {
            SendError::Failed(reason) => assert_eq!(reason, "Send failed: broken pipe"),
            other => panic!("Expected Failed, got {:?}", other),
        }
    }
}
