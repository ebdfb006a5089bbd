//! Relay protocol and WebSocket transport.
//!
//! Messages are JSON objects tagged by `type`. CRDT payloads travel as
//! base64-encoded Loro snapshots.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::broadcast::ReactionEvent;
use crate::error::SyncResult;
use crate::presence::{ConnectionId, PresenceRecord};
use crate::threads::{ThreadId, ThreadMetadata, ThreadMetadataPatch};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Sync CRDT data (base64 encoded Loro bytes)
    Sync { data: String },
    /// Publish our full presence record
    Presence { state: PresenceRecord },
    /// Fire-and-forget event for everyone else in the room
    Broadcast { event: ReactionEvent },
    /// Pin a new comment thread
    CreateThread {
        thread_id: ThreadId,
        metadata: ThreadMetadata,
    },
    /// Edit an existing thread's metadata
    EditThread {
        thread_id: ThreadId,
        patch: ThreadMetadataPatch,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with current state
    Joined {
        room: String,
        connection_id: ConnectionId,
        /// Connections already in the room
        #[serde(default)]
        peers: Vec<ConnectionId>,
        /// Initial sync data (if room has history)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_sync: Option<String>,
        #[serde(default)]
        threads: BTreeMap<ThreadId, ThreadMetadata>,
    },
    /// Peer joined the room
    PeerJoined { connection_id: ConnectionId },
    /// Peer left the room
    PeerLeft { connection_id: ConnectionId },
    /// Sync data from another peer
    Sync { from: ConnectionId, data: String },
    /// Presence record from another peer
    Presence {
        from: ConnectionId,
        state: PresenceRecord,
    },
    /// Broadcast event from another peer
    Broadcast {
        from: ConnectionId,
        event: ReactionEvent,
    },
    /// Stored thread metadata after a create or edit
    ThreadUpdated {
        thread_id: ThreadId,
        metadata: ThreadMetadata,
    },
    /// Error message
    Error { message: String },
}

/// Encode CRDT bytes for a `sync` message.
pub fn encode_payload(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode the payload of a `sync` message.
pub fn decode_payload(data: &str) -> SyncResult<Vec<u8>> {
    Ok(STANDARD.decode(data)?)
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// A text frame from the server, to be handed to the session
    Message(String),
    /// Error occurred
    Error { message: String },
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use crate::error::SyncError;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation. Incoming frames
    /// are collected and must be polled via `poll_events()`.
    pub struct NativeWebSocket {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<SyncEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
    }

    /// At most `max` characters of `msg`, for logging.
    pub(crate) fn preview(msg: &str, max: usize) -> &str {
        msg.char_indices().nth(max).map_or(msg, |(i, _)| &msg[..i])
    }

    /// Check that `url` is a usable WebSocket endpoint.
    pub fn validate_url(url: &str) -> SyncResult<Url> {
        let parsed = Url::parse(url).map_err(|e| SyncError::Transport(format!("Invalid URL: {}", e)))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(SyncError::Transport(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed.scheme()
            )));
        }
        Ok(parsed)
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a WebSocket server.
        pub fn connect(&mut self, url: &str) -> SyncResult<()> {
            if self.cmd_tx.is_some() {
                return Err(SyncError::Transport("Already connected".to_string()));
            }
            validate_url(url)?;

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || {
                log::info!("WebSocket thread: connecting to {}", url);

                match connect(url.as_str()) {
                    Ok((mut socket, response)) => {
                        log::info!("WebSocket connected, status: {}", response.status());
                        let _ = event_tx.send(SyncEvent::Connected);

                        // Short read timeout so the loop can service outgoing commands.
                        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                        }

                        loop {
                            match cmd_rx.try_recv() {
                                Ok(WsCommand::Send(msg)) => {
                                    log::debug!("WebSocket sending: {}", preview(&msg, 100));
                                    if let Err(e) = socket.send(Message::Text(msg.into())) {
                                        log::error!("WebSocket send error: {}", e);
                                        break;
                                    }
                                }
                                Ok(WsCommand::Close) => {
                                    log::info!("WebSocket close requested");
                                    let _ = socket.close(None);
                                    break;
                                }
                                Err(TryRecvError::Disconnected) => {
                                    log::info!("WebSocket command channel disconnected");
                                    break;
                                }
                                Err(TryRecvError::Empty) => {}
                            }

                            match socket.read() {
                                Ok(Message::Text(txt)) => {
                                    let _ = event_tx.send(SyncEvent::Message(txt.to_string()));
                                }
                                Ok(Message::Ping(data)) => {
                                    let _ = socket.send(Message::Pong(data));
                                }
                                Ok(Message::Close(_)) => {
                                    log::info!("WebSocket received close frame");
                                    break;
                                }
                                Ok(_) => {}
                                Err(tungstenite::Error::Io(ref e))
                                    if e.kind() == std::io::ErrorKind::WouldBlock
                                        || e.kind() == std::io::ErrorKind::TimedOut =>
                                {
                                    continue;
                                }
                                Err(e) => {
                                    log::error!("WebSocket read error: {}", e);
                                    break;
                                }
                            }
                        }

                        log::info!("WebSocket thread exiting");
                        let _ = event_tx.send(SyncEvent::Disconnected);
                    }
                    Err(e) => {
                        log::error!("WebSocket connection failed: {}", e);
                        let _ = event_tx.send(SyncEvent::Error {
                            message: format!("Connection failed: {}", e),
                        });
                    }
                }
            });

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);

            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        /// Send a text message.
        pub fn send(&self, msg: &str) -> SyncResult<()> {
            match &self.cmd_tx {
                Some(tx) => tx
                    .send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| SyncError::Transport(format!("Send failed: {}", e))),
                None => Err(SyncError::Transport("Not connected".to_string())),
            }
        }

        /// Poll for pending events (non-blocking).
        pub fn poll_events(&mut self) -> Vec<SyncEvent> {
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        SyncEvent::Message(_) => {}
                    }
                    self.events.push(event);
                }
            }

            std::mem::take(&mut self.events)
        }

        /// Get current connection state.
        pub fn state(&self) -> ConnectionState {
            self.state
        }

        /// Check if connected.
        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::{NativeWebSocket, validate_url};

/// Platform-specific WebSocket client type.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformWebSocket = NativeWebSocket;

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn test_payload_roundtrip() {
        let data = b"\x00\x01loro\xff";
        let encoded = encode_payload(data);
        assert_eq!(decode_payload(&encoded).unwrap(), data.to_vec());
        assert!(decode_payload("not base64!").is_err());
    }

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join {
            room: "test-room".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","room":"test-room"}"#);

        let msg = ClientMessage::Broadcast {
            event: ReactionEvent::new(Point::new(10.0, 20.0), "🎉"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with(r#"{"type":"broadcast","event":"#));
    }

    #[test]
    fn test_server_message_deserialize() {
        let json = r#"{"type":"joined","room":"test","connection_id":4,"peers":[1,2]}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::Joined {
                room,
                connection_id,
                peers,
                initial_sync,
                threads,
            } => {
                assert_eq!(room, "test");
                assert_eq!(connection_id, 4);
                assert_eq!(peers, vec![1, 2]);
                assert!(initial_sync.is_none());
                assert!(threads.is_empty());
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_presence_message() {
        let json = r#"{"type":"presence","from":3,"state":{"cursor":null,"message":"hi"}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Presence {
                from: 3,
                state: PresenceRecord {
                    cursor: None,
                    message: Some("hi".to_string()),
                },
            }
        );
    }

    #[test]
    fn test_edit_thread_message() {
        let msg = ClientMessage::EditThread {
            thread_id: "t1".to_string(),
            patch: ThreadMetadataPatch {
                z_index: Some(3),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"edit_thread","thread_id":"t1","patch":{"z_index":3}}"#);
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let msg = format!("{}é", "x".repeat(99));
        assert_eq!(native_client::preview(&msg, 100), msg);
        assert_eq!(native_client::preview(&msg, 99), "x".repeat(99));
        assert_eq!(native_client::preview("🎉🎉", 1), "🎉");
        assert_eq!(native_client::preview("", 5), "");
    }

    #[test]
    fn test_socket_sends_multibyte_text() {
        use crate::testing::{debug_logging, spawn_socket_server};
        use std::time::{Duration, Instant};

        debug_logging();
        let (url, received) = spawn_socket_server(None);
        let mut socket = NativeWebSocket::new();
        socket.connect(&url).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !socket.is_connected() && Instant::now() < deadline {
            socket.poll_events();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(socket.is_connected());

        // The 100-byte log cut falls inside the trailing character.
        let msg = format!(r#"{{"type":"join","room":"{}é"}}"#, "x".repeat(76));
        socket.send(&msg).unwrap();
        assert_eq!(received.recv_timeout(Duration::from_secs(5)).unwrap(), msg);
        socket.poll_events();
        assert!(socket.is_connected());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("ws://localhost:3030/ws").is_ok());
        assert!(validate_url("http://localhost:3030").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
