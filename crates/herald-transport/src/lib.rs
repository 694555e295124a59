//! # herald-transport
//!
//! Transport layer for the Herald chat bot.
//!
//! - **WebSocket** - the live Twitch chat connection (feature `websocket`)
//! - **Memory** - recording and logging senders for tests and dry runs
//!
//! Every transport implements [`herald_core::Sender`], so the dispatch
//! queues never know which one they are talking to.
//!
//! ```rust,ignore
//! use herald_transport::{ChatClientConfig, ChatConnection};
//!
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(1024);
//! let connection = ChatConnection::connect(config, events_tx).await?;
//! let sender = connection.sender();
//! while let Some(event) = events_rx.recv().await {
//!     // Dispatch event
//! }
//! ```

pub mod error;
pub mod memory;
pub mod outbound;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::TransportError;
pub use memory::{LogSender, RecordingSender, SentMessage};
pub use outbound::to_command;

#[cfg(feature = "websocket")]
pub use websocket::{ChatClientConfig, ChatConnection, ChatSender, DEFAULT_CHAT_URL};
