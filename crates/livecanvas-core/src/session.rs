//! Room session: one client's view of a shared room.
//!
//! Owns the object store replica, the shared history, presence, broadcast and
//! thread metadata, and translates between them and relay messages. The
//! session never touches the drawing surface; it raises a storage-changed flag
//! that the reconciler consumes.

use crate::broadcast::{BroadcastChannel, ReactionEvent};
use crate::config::LiveConfig;
use crate::crdt::{MutationScope, ObjectStore};
use crate::error::{SyncError, SyncResult};
use crate::history::{HistoryManager, ScopeOrigin};
use crate::presence::{ConnectionId, PresenceChannel, PresenceUpdate};
use crate::sync::{ClientMessage, ServerMessage, decode_payload, encode_payload};
use crate::threads::{ThreadBoard, ThreadId, ThreadMetadataPatch};

/// What an incoming relay message did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Joined a room. The store now holds the room's authoritative state.
    Joined {
        room: String,
        connection_id: ConnectionId,
        peers: Vec<ConnectionId>,
    },
    PeerJoined(ConnectionId),
    PeerLeft(ConnectionId),
    /// Remote changes were merged into the store.
    StorageChanged { from: ConnectionId, objects: usize },
    PresenceChanged(ConnectionId),
    /// A broadcast event was delivered to the broadcast channel.
    BroadcastReceived(ConnectionId),
    ThreadUpdated(ThreadId),
    Error(String),
}

/// Manages one client's membership and state in a room.
pub struct RoomSession {
    store: ObjectStore,
    history: HistoryManager,
    presence: PresenceChannel,
    broadcast: BroadcastChannel,
    threads: ThreadBoard,
    /// Id the relay assigned to this connection.
    connection_id: Option<ConnectionId>,
    /// Current room ID (if connected).
    current_room: Option<String>,
    /// Room to rejoin after the transport reconnects.
    rejoin: Option<String>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    /// Set whenever the store changed and the surface has not caught up.
    storage_changed: bool,
}

impl RoomSession {
    pub fn new(config: &LiveConfig) -> Self {
        Self {
            store: ObjectStore::new(),
            history: HistoryManager::new(config.max_undo_steps),
            presence: PresenceChannel::new(),
            broadcast: BroadcastChannel::new(),
            threads: ThreadBoard::new(),
            connection_id: None,
            current_room: None,
            rejoin: None,
            outgoing: Vec::new(),
            storage_changed: false,
        }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    pub fn broadcast(&mut self) -> &mut BroadcastChannel {
        &mut self.broadcast
    }

    pub fn threads(&self) -> &ThreadBoard {
        &self.threads
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    // --- Room/Connection Management ---

    /// Get the current room ID.
    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    /// Check if we're in a room.
    pub fn is_in_room(&self) -> bool {
        self.current_room.is_some()
    }

    /// Request to join a room. Queues the join message.
    pub fn join_room(&mut self, room: &str) {
        self.queue(&ClientMessage::Join {
            room: room.to_string(),
        });
    }

    /// Request to leave the current room. Queues the leave message.
    pub fn leave_room(&mut self) {
        if self.current_room.take().is_some() {
            self.queue(&ClientMessage::Leave);
            self.connection_id = None;
            self.presence.clear_others();
        }
    }

    /// The transport dropped. Remember the room so it can be rejoined.
    pub fn on_disconnected(&mut self) {
        if let Some(room) = self.current_room.take() {
            log::info!("Lost connection to room {}", room);
            self.rejoin = Some(room);
            self.connection_id = None;
            self.presence.clear_others();
            self.outgoing.clear();
        }
    }

    /// The transport (re)connected. Rejoins the last room; its snapshot is
    /// merged into the store and the surface is fully reconciled against it.
    pub fn on_connected(&mut self) {
        if let Some(room) = self.rejoin.take() {
            self.join_room(&room);
        }
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to encode message: {}", e),
        }
    }

    /// Take pending outgoing messages (drains the queue).
    ///
    /// Presence and broadcast events produced since the last call are
    /// appended here. Outside a room they are dropped.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        let events = self.broadcast.take_outgoing();
        if self.is_in_room() {
            if let Some(state) = self.presence.take_pending() {
                self.queue(&ClientMessage::Presence { state });
            }
            for event in events {
                self.queue(&ClientMessage::Broadcast { event });
            }
        } else if !events.is_empty() {
            log::debug!("Dropping {} broadcast events outside a room", events.len());
        }
        std::mem::take(&mut self.outgoing)
    }

    // --- Storage ---

    /// Run one mutation scope against the store.
    ///
    /// A scope that changes anything becomes one undoable unit and is
    /// published to the room.
    pub fn mutate<T>(&mut self, f: impl FnOnce(&mut MutationScope<'_>) -> SyncResult<T>) -> SyncResult<T> {
        let (value, changes) = self.store.mutate(f)?;
        if !changes.is_empty() {
            log::debug!("Committed local scope touching {} objects", changes.len());
            self.history.record(ScopeOrigin::Local, changes);
            self.mark_changed();
        }
        Ok(value)
    }

    fn mark_changed(&mut self) {
        self.storage_changed = true;
        self.broadcast_sync();
    }

    /// Queue a sync broadcast with current CRDT state.
    pub fn broadcast_sync(&mut self) {
        if self.is_in_room() {
            let data = encode_payload(&self.store.export_snapshot());
            self.queue(&ClientMessage::Sync { data });
        }
    }

    /// Whether the store changed since the last call.
    pub fn take_storage_changed(&mut self) -> bool {
        std::mem::take(&mut self.storage_changed)
    }

    // --- Undo/Redo ---

    /// Undo the most recent scope, whoever authored it.
    pub fn undo(&mut self) -> SyncResult<bool> {
        match self.history.undo(&mut self.store)? {
            Some(changes) => {
                if !changes.is_empty() {
                    self.mark_changed();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Redo the last undone scope.
    pub fn redo(&mut self) -> SyncResult<bool> {
        match self.history.redo(&mut self.store)? {
            Some(changes) => {
                if !changes.is_empty() {
                    self.mark_changed();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Presence / Broadcast ---

    /// Merge a partial update into our presence; published on the next drain.
    pub fn update_presence(&mut self, update: PresenceUpdate) -> bool {
        self.presence.update(update)
    }

    /// Send an event to everyone currently in the room.
    pub fn emit(&mut self, event: ReactionEvent) {
        self.broadcast.emit(event);
    }

    // --- Threads ---

    /// Pin a new comment thread and publish it.
    pub fn create_thread(&mut self, x: f64, y: f64) -> SyncResult<ThreadId> {
        if !self.is_in_room() {
            return Err(SyncError::NotInRoom);
        }
        let (thread_id, metadata) = self.threads.create(x, y);
        self.queue(&ClientMessage::CreateThread {
            thread_id: thread_id.clone(),
            metadata,
        });
        Ok(thread_id)
    }

    /// Raise a focused thread to the top. Returns whether an edit was sent.
    pub fn focus_thread(&mut self, thread_id: &str) -> bool {
        if !self.is_in_room() {
            return false;
        }
        match self.threads.bring_to_front(thread_id) {
            Some(patch) => {
                self.queue(&ClientMessage::EditThread {
                    thread_id: thread_id.to_string(),
                    patch,
                });
                true
            }
            None => false,
        }
    }

    /// Edit a thread's metadata. Returns whether an edit was sent.
    pub fn edit_thread(&mut self, thread_id: &str, patch: ThreadMetadataPatch) -> bool {
        if !self.is_in_room() {
            return false;
        }
        match self.threads.edit(thread_id, patch) {
            Some(patch) => {
                self.queue(&ClientMessage::EditThread {
                    thread_id: thread_id.to_string(),
                    patch,
                });
                true
            }
            None => false,
        }
    }

    // --- Incoming Message Handling ---

    /// Handle an incoming server message.
    /// Returns a SessionEvent describing what happened.
    pub fn handle_message(&mut self, json: &str) -> Option<SessionEvent> {
        let msg: ServerMessage = match serde_json::from_str(json) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Failed to parse server message: {}", e);
                return None;
            }
        };

        match msg {
            ServerMessage::Joined {
                room,
                connection_id,
                peers,
                initial_sync,
                threads,
            } => {
                log::info!("Joined room {} as connection {}", room, connection_id);
                self.current_room = Some(room.clone());
                self.connection_id = Some(connection_id);
                self.presence.clear_others();
                self.presence.mark_dirty();
                self.threads.replace_all(threads);
                self.history.clear();

                if let Some(data) = initial_sync {
                    if let Err(e) = self.import(&data) {
                        log::warn!("Failed to import initial state: {}", e);
                    }
                }
                // Reconcile against whatever we now hold, and share any local
                // state the room has not seen.
                self.storage_changed = true;
                if !self.store.is_empty() {
                    self.broadcast_sync();
                }

                Some(SessionEvent::Joined {
                    room,
                    connection_id,
                    peers,
                })
            }
            ServerMessage::PeerJoined { connection_id } => {
                self.presence.mark_dirty();
                Some(SessionEvent::PeerJoined(connection_id))
            }
            ServerMessage::PeerLeft { connection_id } => {
                self.presence.remove_peer(connection_id);
                Some(SessionEvent::PeerLeft(connection_id))
            }
            ServerMessage::Sync { from, data } => match self.import(&data) {
                Ok(changes) => {
                    if changes.is_empty() {
                        return None;
                    }
                    let objects = changes.len();
                    self.history.record(ScopeOrigin::Remote, changes);
                    self.storage_changed = true;
                    Some(SessionEvent::StorageChanged { from, objects })
                }
                Err(e) => {
                    log::warn!("Failed to import sync from {}: {}", from, e);
                    None
                }
            },
            ServerMessage::Presence { from, state } => {
                self.presence.apply_remote(from, state);
                Some(SessionEvent::PresenceChanged(from))
            }
            ServerMessage::Broadcast { from, event } => {
                self.broadcast.deliver(from, event);
                Some(SessionEvent::BroadcastReceived(from))
            }
            ServerMessage::ThreadUpdated { thread_id, metadata } => {
                self.threads.apply_remote(thread_id.clone(), metadata);
                Some(SessionEvent::ThreadUpdated(thread_id))
            }
            ServerMessage::Error { message } => {
                log::warn!("Relay error: {}", message);
                Some(SessionEvent::Error(message))
            }
        }
    }

    fn import(&mut self, data: &str) -> SyncResult<Vec<crate::crdt::RecordChange>> {
        let bytes = decode_payload(data)?;
        self.store.import(&bytes)
    }
}

impl Default for RoomSession {
    fn default() -> Self {
        Self::new(&LiveConfig::default())
    }
}
