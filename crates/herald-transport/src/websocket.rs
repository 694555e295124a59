//! WebSocket chat client.
//!
//! Connects to the Twitch chat WebSocket endpoint using tokio-tungstenite,
//! performs the login handshake and then runs two tasks:
//!
//! - a **writer** that owns the sink and acknowledges every line it writes
//! - a **reader** that decodes lines, answers PINGs and forwards classified
//!   [`InboundEvent`]s into the caller's channel
//!
//! Reconnection is left to the caller.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use herald_core::{normalize_identity, OutboundMessage, SendError, Sender};
use herald_protocol::{codec, Command, InboundEvent, MAX_LINE_LENGTH};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, trace, warn};

use crate::error::TransportError;
use crate::outbound::to_command;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default Twitch chat endpoint.
pub const DEFAULT_CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Capabilities requested during login.
const CAPABILITIES: [&str; 3] = [
    "twitch.tv/membership",
    "twitch.tv/tags",
    "twitch.tv/commands",
];

/// Chat client configuration.
#[derive(Clone)]
pub struct ChatClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Bot login.
    pub username: String,
    /// OAuth token, with or without the `oauth:` prefix.
    pub oauth_token: String,
    /// Channels to join after login.
    pub channels: Vec<String>,
}

impl std::fmt::Debug for ChatClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClientConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("oauth_token", &"<redacted>")
            .field("channels", &self.channels)
            .finish()
    }
}

impl ChatClientConfig {
    /// Commands sent right after the socket opens.
    #[must_use]
    pub fn login_commands(&self) -> Vec<Command> {
        let token = if self.oauth_token.starts_with("oauth:") {
            self.oauth_token.clone()
        } else {
            format!("oauth:{}", self.oauth_token)
        };

        let mut commands = vec![
            Command::CapReq(CAPABILITIES.iter().map(|c| c.to_string()).collect()),
            Command::Pass(token),
            Command::Nick(normalize_identity(&self.username)),
        ];
        commands.extend(
            self.channels
                .iter()
                .map(|c| Command::Join(format!("#{}", normalize_identity(c)))),
        );
        commands
    }
}

/// A line queued for the writer task.
struct Outgoing {
    line: String,
    ack: Option<oneshot::Sender<Result<(), TransportError>>>,
}

/// Cloneable handle that writes to the chat connection.
#[derive(Clone)]
pub struct ChatSender {
    tx: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl ChatSender {
    /// Write a command and wait until the socket accepted it.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the write fails.
    pub async fn send_command(&self, command: &Command) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Outgoing {
                line: command.encode(),
                ack: Some(ack_tx),
            })
            .map_err(|_| TransportError::ConnectionClosed)?;

        ack_rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sender for ChatSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        self.send_command(&to_command(message))
            .await
            .map_err(SendError::from)
    }
}

/// An established chat connection.
pub struct ChatConnection {
    sender: ChatSender,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ChatConnection {
    /// Connect, log in and start forwarding events into `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket cannot be opened or the login
    /// commands cannot be written.
    pub async fn connect(
        config: ChatClientConfig,
        events: mpsc::Sender<InboundEvent>,
    ) -> Result<Self, TransportError> {
        info!(url = %config.url, username = %config.username, "Connecting to chat");

        let (ws, _response) = connect_async(config.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut sink, stream) = ws.split();

        for command in config.login_commands() {
            sink.send(Message::Text(command.encode()))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        debug!(channels = ?config.channels, "Login sent");

        let open = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ChatSender {
            tx: tx.clone(),
            open: Arc::clone(&open),
        };

        let writer = tokio::spawn(run_writer(sink, rx, Arc::clone(&open)));
        let reader = tokio::spawn(run_reader(
            stream,
            tx,
            events,
            normalize_identity(&config.username),
            open,
        ));

        Ok(Self {
            sender,
            reader,
            writer,
        })
    }

    /// A handle for writing to this connection.
    #[must_use]
    pub fn sender(&self) -> ChatSender {
        self.sender.clone()
    }

    /// Wait until the server side of the connection ends.
    pub async fn closed(self) {
        if let Err(e) = self.reader.await {
            error!("Chat reader task failed: {}", e);
        }
        self.writer.abort();
    }
}

async fn run_writer(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    open: Arc<AtomicBool>,
) {
    while let Some(outgoing) = rx.recv().await {
        trace!(line = %outgoing.line.trim_end(), "Writing line");
        let result = sink
            .send(Message::Text(outgoing.line))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()));
        let failed = result.is_err();

        if let Some(ack) = outgoing.ack {
            let _ = ack.send(result);
        }
        if failed {
            warn!("Chat write failed, closing writer");
            break;
        }
    }

    open.store(false, Ordering::SeqCst);
    if let Err(e) = sink.close().await {
        debug!("Failed to close chat sink: {}", e);
    }
}

async fn run_reader(
    mut stream: SplitStream<WsStream>,
    writer: mpsc::UnboundedSender<Outgoing>,
    events: mpsc::Sender<InboundEvent>,
    bot_username: String,
    open: Arc<AtomicBool>,
) {
    let mut read_buffer = BytesMut::with_capacity(4096);

    'read: loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_LINE_LENGTH * 16 {
                    warn!(size = text.len(), "Dropping oversized chat frame");
                    continue;
                }
                read_buffer.extend_from_slice(text.as_bytes());

                loop {
                    let message = match codec::decode_from(&mut read_buffer) {
                        Ok(Some(message)) => message,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed chat line");
                            continue;
                        }
                    };

                    match message.command.as_str() {
                        "PING" => {
                            let token = message.param(0).unwrap_or("tmi.twitch.tv");
                            let _ = writer.send(Outgoing {
                                line: Command::Pong(token.to_string()).encode(),
                                ack: None,
                            });
                        }
                        "RECONNECT" => {
                            warn!("Server requested reconnect");
                        }
                        "NOTICE" => {
                            info!(notice = message.param(1).unwrap_or_default(), "Server notice");
                        }
                        _ => {
                            if let Some(event) = InboundEvent::from_irc(&message, &bot_username) {
                                if events.send(event).await.is_err() {
                                    debug!("Event receiver dropped, stopping reader");
                                    break 'read;
                                }
                            }
                        }
                    }
                }
            }
            Some(Ok(Message::Close(_))) => {
                debug!("Received close frame");
                break;
            }
            Some(Ok(_)) => {
                // Binary, ping, pong and raw frames carry no chat lines.
            }
            Some(Err(WsError::ConnectionClosed)) | None => {
                debug!("Chat stream ended");
                break;
            }
            Some(Err(e)) => {
                error!("Chat connection error: {}", e);
                break;
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    info!("Chat connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChatClientConfig {
        ChatClientConfig {
            url: DEFAULT_CHAT_URL.to_string(),
            username: "Herald".to_string(),
            oauth_token: "abc123".to_string(),
            channels: vec!["#Lobby".to_string(), "games".to_string()],
        }
    }

    #[test]
    fn test_login_commands() {
        let lines: Vec<_> = config().login_commands().iter().map(Command::encode).collect();
        assert_eq!(
            lines,
            [
                "CAP REQ :twitch.tv/membership twitch.tv/tags twitch.tv/commands\r\n",
                "PASS oauth:abc123\r\n",
                "NICK herald\r\n",
                "JOIN #lobby\r\n",
                "JOIN #games\r\n",
            ]
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("abc123"));
    }

    #[tokio::test]
    async fn test_closed_sender_rejects() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sender = ChatSender {
            tx,
            open: Arc::new(AtomicBool::new(false)),
        };

        let message = OutboundMessage::chat("lobby", "hi").unwrap();
        assert!(matches!(
            sender.send(&message).await,
            Err(SendError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_dropped_writer_fails_send() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = ChatSender {
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };

        assert!(matches!(
            sender.send_command(&Command::chat("#lobby", "hi")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
