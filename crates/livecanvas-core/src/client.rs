//! Client facade: routes typed input to the engine's components.
//!
//! The host application forwards pointer, keyboard, design-panel and surface
//! events as [`InputEvent`] messages, hands over relay messages as they
//! arrive, calls [`LiveClient::tick`] from its frame loop, and sends whatever
//! [`LiveClient::take_outgoing`] returns.

use kurbo::{Point, Size};

use crate::broadcast::{ActiveReactions, Interval, ReactionEvent};
use crate::config::LiveConfig;
use crate::cursor::CursorMachine;
use crate::error::SyncResult;
use crate::presence::PresenceUpdate;
use crate::reconciler::{ReconcileReport, Reconciler, SessionState};
use crate::record::AttributeUpdate;
use crate::session::{RoomSession, SessionEvent};
use crate::surface::{DrawingSurface, SurfaceEvent};
#[cfg(not(target_arch = "wasm32"))]
use crate::sync::{PlatformWebSocket, SyncEvent};
use crate::threads::{ThreadId, ThreadMetadataPatch};

/// Modifier keys held during a key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        meta: false,
        shift: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        meta: false,
        shift: false,
    };

    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Everything the host can tell the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// A key was released. `key` uses DOM key names ("e", "/", "Escape", "Delete").
    KeyUp { key: String, modifiers: Modifiers },
    PointerMove(Point),
    PointerDown(Point),
    PointerUp,
    PointerLeave,
    /// A reaction was chosen in the selector.
    ReactionPicked(String),
    /// Cursor-chat text changed.
    ChatInput(String),
    /// Enter pressed in cursor chat.
    ChatSubmit,
    /// Lifecycle notification from the drawing surface.
    Surface(SurfaceEvent),
    /// Design-panel edit of the selection.
    SetAttribute(AttributeUpdate),
    Undo,
    Redo,
    DeleteSelected,
    /// Clear the whole canvas.
    Reset,
    Resize(Size),
    CreateThread(Point),
    FocusThread(ThreadId),
    ResolveThread { thread_id: ThreadId, resolved: bool },
}

impl InputEvent {
    pub fn key(key: &str) -> Self {
        InputEvent::KeyUp {
            key: key.to_string(),
            modifiers: Modifiers::NONE,
        }
    }
}

/// One user's connection to a shared canvas.
pub struct LiveClient<S: DrawingSurface> {
    config: LiveConfig,
    surface: S,
    session: RoomSession,
    reconciler: Reconciler,
    cursor: CursorMachine,
    reactions: ActiveReactions,
    emit_timer: Interval,
    sweep_timer: Interval,
}

impl<S: DrawingSurface> LiveClient<S> {
    pub fn new(surface: S, config: LiveConfig) -> Self {
        Self {
            session: RoomSession::new(&config),
            reconciler: Reconciler::new(),
            cursor: CursorMachine::new(),
            reactions: ActiveReactions::new(config.reaction_ttl_ms),
            emit_timer: Interval::new(config.reaction_emit_interval_ms),
            sweep_timer: Interval::new(config.reaction_sweep_interval_ms),
            surface,
            config,
        }
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn session(&self) -> &RoomSession {
        &self.session
    }

    pub fn cursor(&self) -> &CursorMachine {
        &self.cursor
    }

    pub fn reactions(&self) -> &ActiveReactions {
        &self.reactions
    }

    pub fn state(&self) -> &SessionState {
        self.reconciler.state()
    }

    pub fn join_room(&mut self, room: &str) {
        self.session.join_room(room);
    }

    pub fn leave_room(&mut self) {
        self.session.leave_room();
    }

    /// The relay connection dropped.
    pub fn on_disconnected(&mut self) {
        self.session.on_disconnected();
    }

    /// The relay connection came back; rejoins the last room.
    pub fn on_connected(&mut self) {
        self.session.on_connected();
    }

    /// Messages to send to the relay, in order.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        self.session.take_outgoing()
    }

    /// Dispatch one input event.
    pub fn handle_input(&mut self, event: InputEvent) -> SyncResult<()> {
        match event {
            InputEvent::KeyUp { key, modifiers } => self.handle_key(&key, modifiers)?,
            InputEvent::PointerMove(point) => {
                let current = self.session.presence().me().cursor;
                if let Some(update) = self.cursor.pointer_move(current, point) {
                    self.session.update_presence(update);
                }
            }
            InputEvent::PointerDown(point) => {
                self.session.update_presence(PresenceUpdate::cursor(Some(point)));
                self.cursor.pointer_down();
            }
            InputEvent::PointerUp => self.cursor.pointer_up(),
            InputEvent::PointerLeave => {
                let update = self.cursor.pointer_leave();
                self.session.update_presence(update);
            }
            InputEvent::ReactionPicked(value) => {
                self.cursor.pick_reaction(value);
            }
            InputEvent::ChatInput(text) => {
                if let Some(update) = self.cursor.chat_input(&text) {
                    self.session.update_presence(update);
                }
            }
            InputEvent::ChatSubmit => {
                self.cursor.chat_submit();
            }
            InputEvent::Surface(event) => {
                let editing_ended = self
                    .reconciler
                    .on_surface_event(event, &self.surface, &mut self.session)?;
                if editing_ended {
                    self.reconcile();
                }
            }
            InputEvent::SetAttribute(update) => {
                self.reconciler
                    .apply_attribute(&update, &mut self.surface, &mut self.session)?;
            }
            InputEvent::Undo => {
                self.session.undo()?;
            }
            InputEvent::Redo => {
                self.session.redo()?;
            }
            InputEvent::DeleteSelected => {
                self.reconciler.delete_selected(&mut self.surface, &mut self.session)?;
            }
            InputEvent::Reset => {
                self.reconciler.reset(&mut self.surface, &mut self.session)?;
            }
            InputEvent::Resize(size) => self.surface.resize(size),
            InputEvent::CreateThread(point) => {
                self.session.create_thread(point.x, point.y)?;
            }
            InputEvent::FocusThread(thread_id) => {
                self.session.focus_thread(&thread_id);
            }
            InputEvent::ResolveThread { thread_id, resolved } => {
                let patch = ThreadMetadataPatch {
                    resolved: Some(resolved),
                    ..Default::default()
                };
                self.session.edit_thread(&thread_id, patch);
            }
        }
        self.sync_surface();
        Ok(())
    }

    fn handle_key(&mut self, key: &str, modifiers: Modifiers) -> SyncResult<()> {
        if modifiers.command() {
            match key {
                "z" | "Z" => {
                    self.session.undo()?;
                }
                "y" | "Y" => {
                    self.session.redo()?;
                }
                _ => {}
            }
            return Ok(());
        }
        match key {
            "Delete" | "Backspace" => {
                self.reconciler.delete_selected(&mut self.surface, &mut self.session)?;
            }
            _ => {
                if let Some(update) = self.cursor.key(key) {
                    self.session.update_presence(update);
                }
            }
        }
        Ok(())
    }

    /// Handle one relay message, stamping received reactions with `now_ms`.
    pub fn handle_server_message(&mut self, json: &str, now_ms: u64) -> Option<SessionEvent> {
        let event = self.session.handle_message(json);
        for (_, reaction) in self.session.broadcast().take_received() {
            self.reactions.push(reaction.point(), reaction.value, now_ms);
        }
        self.sync_surface();
        event
    }

    /// Drive the reaction timers.
    pub fn tick(&mut self, now_ms: u64) {
        if self.emit_timer.due(now_ms) {
            let cursor = self.session.presence().me().cursor;
            if let (Some(value), Some(point)) = (self.cursor.pressed_reaction(), cursor) {
                let value = value.to_string();
                self.reactions.push(point, value.clone(), now_ms);
                self.session.emit(ReactionEvent::new(point, value));
            }
        }
        if self.sweep_timer.due(now_ms) {
            let expired = self.reactions.sweep(now_ms);
            if expired > 0 {
                log::debug!("Expired {} reactions", expired);
            }
        }
    }

    /// Open a socket to the configured relay.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn connect(&self) -> SyncResult<PlatformWebSocket> {
        let mut socket = PlatformWebSocket::new();
        socket.connect(&self.config.server_url)?;
        Ok(socket)
    }

    /// Exchange pending messages with the relay socket.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn pump_socket(&mut self, socket: &mut PlatformWebSocket, now_ms: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for event in socket.poll_events() {
            match event {
                SyncEvent::Connected => self.on_connected(),
                SyncEvent::Disconnected => self.on_disconnected(),
                SyncEvent::Message(json) => events.extend(self.handle_server_message(&json, now_ms)),
                SyncEvent::Error { message } => log::warn!("Relay connection error: {}", message),
            }
        }
        if socket.is_connected() {
            for msg in self.take_outgoing() {
                if let Err(e) = socket.send(&msg) {
                    log::warn!("Dropping outgoing message: {}", e);
                }
            }
        }
        events
    }

    /// Run a full reconciliation pass against the current store.
    pub fn reconcile(&mut self) -> ReconcileReport {
        let snapshot = self.session.store().snapshot();
        let report = self.reconciler.reconcile(&snapshot, &mut self.surface);
        if !report.is_noop() {
            log::debug!(
                "Reconciled surface: {} created, {} updated, {} removed",
                report.created.len(),
                report.updated.len(),
                report.removed.len()
            );
        }
        report
    }

    fn sync_surface(&mut self) {
        if self.session.take_storage_changed() {
            self.reconcile();
        }
    }
}
