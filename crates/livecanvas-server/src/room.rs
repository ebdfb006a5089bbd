//! Room bookkeeping for the relay.
//!
//! Each room fans messages out over a tokio broadcast channel. Every envelope
//! names the connection to skip, so `sync`, `presence` and `broadcast` are
//! never echoed to their sender while thread updates reach everyone.
//!
//! Sync payloads are merged into a per-room document so a late joiner
//! receives every peer's edits, not just the last sender's.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use livecanvas_core::crdt::ObjectStore;
use livecanvas_core::presence::ConnectionId;
use livecanvas_core::sync::{ClientMessage, ServerMessage, decode_payload, encode_payload};
use livecanvas_core::threads::{ThreadId, ThreadMetadata};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const CHANNEL_CAPACITY: usize = 256;

/// A message on a room's channel and the connection that must not receive it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub skip: Option<ConnectionId>,
    pub message: ServerMessage,
}

impl Envelope {
    /// Whether `connection` should receive this envelope.
    pub fn is_for(&self, connection: ConnectionId) -> bool {
        self.skip != Some(connection)
    }
}

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<Envelope>,
    /// Connected peers
    peers: BTreeSet<ConnectionId>,
    /// Merged document state, once anyone has synced
    store: Option<ObjectStore>,
    /// Comment thread metadata
    threads: BTreeMap<ThreadId, ThreadMetadata>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: BTreeSet::new(),
            store: None,
            threads: BTreeMap::new(),
        }
    }

    fn send(&self, skip: Option<ConnectionId>, message: ServerMessage) {
        // No receivers is fine: nobody else is listening yet.
        let _ = self.tx.send(Envelope { skip, message });
    }

    /// Fold a peer's payload into the room document.
    fn merge(&mut self, data: &str) -> Result<(), String> {
        let bytes = decode_payload(data).map_err(|e| e.to_string())?;
        self.store
            .get_or_insert_with(ObjectStore::new)
            .merge(&bytes)
            .map_err(|e| e.to_string())
    }

    fn initial_sync(&self) -> Option<String> {
        self.store
            .as_ref()
            .map(|store| encode_payload(&store.export_snapshot()))
    }
}

/// Shared application state
pub struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
    next_connection: AtomicU64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Hand out a fresh connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a connection to a room.
    ///
    /// Returns the room subscription and the `joined` reply for the newcomer;
    /// everyone already present is told about the newcomer.
    pub fn join_room(&self, room_id: &str, connection: ConnectionId) -> (broadcast::Receiver<Envelope>, ServerMessage) {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        let peers: Vec<_> = room.peers.iter().copied().collect();
        room.peers.insert(connection);
        let rx = room.tx.subscribe();
        let joined = ServerMessage::Joined {
            room: room_id.to_string(),
            connection_id: connection,
            peers,
            initial_sync: room.initial_sync(),
            threads: room.threads.clone(),
        };
        room.send(
            Some(connection),
            ServerMessage::PeerJoined {
                connection_id: connection,
            },
        );
        info!("Connection {} joined room {} ({} peers)", connection, room_id, room.peers.len());
        (rx, joined)
    }

    /// Remove a connection from a room and tell the others.
    pub fn leave_room(&self, room_id: &str, connection: ConnectionId) {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return;
        };
        if !room.peers.remove(&connection) {
            return;
        }
        room.send(
            Some(connection),
            ServerMessage::PeerLeft {
                connection_id: connection,
            },
        );
        info!("Connection {} left room {}", connection, room_id);
        // Clean up empty rooms
        if room.peers.is_empty() {
            drop(room);
            self.rooms.remove(room_id);
            debug!("Room {} closed", room_id);
        }
    }

    /// Route an in-room message from `connection`.
    ///
    /// Returns a reply for the sender only (errors). `join` and `leave` are
    /// handled by the connection loop and ignored here.
    pub fn handle(&self, room_id: &str, connection: ConnectionId, msg: ClientMessage) -> Option<ServerMessage> {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return Some(ServerMessage::Error {
                message: format!("Room {} does not exist", room_id),
            });
        };

        match msg {
            ClientMessage::Sync { data } => {
                if let Err(e) = room.merge(&data) {
                    warn!("Rejected sync from {} in room {}: {}", connection, room_id, e);
                    return Some(ServerMessage::Error {
                        message: format!("Invalid sync payload: {}", e),
                    });
                }
                room.send(Some(connection), ServerMessage::Sync { from: connection, data });
            }
            ClientMessage::Presence { state } => {
                room.send(Some(connection), ServerMessage::Presence { from: connection, state });
            }
            ClientMessage::Broadcast { event } => {
                room.send(Some(connection), ServerMessage::Broadcast { from: connection, event });
            }
            ClientMessage::CreateThread { thread_id, metadata } => {
                if room.threads.contains_key(&thread_id) {
                    return Some(ServerMessage::Error {
                        message: format!("Thread {} already exists", thread_id),
                    });
                }
                room.threads.insert(thread_id.clone(), metadata);
                room.send(None, ServerMessage::ThreadUpdated { thread_id, metadata });
            }
            ClientMessage::EditThread { thread_id, patch } => {
                let Some(metadata) = room.threads.get_mut(&thread_id) else {
                    return Some(ServerMessage::Error {
                        message: format!("Unknown thread {}", thread_id),
                    });
                };
                patch.apply(metadata);
                let metadata = *metadata;
                room.send(None, ServerMessage::ThreadUpdated { thread_id, metadata });
            }
            ClientMessage::Join { .. } | ClientMessage::Leave => {}
        }
        None
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|r| r.peers.len()).unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
