//! LiveCanvas Core Library
//!
//! Real-time synchronization engine for a shared 2-D canvas: the shared object
//! store, presence and broadcast channels, the cursor state machine, shared
//! undo/redo, and the reconciler that keeps a local drawing surface in step
//! with the room.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod crdt;
pub mod cursor;
pub mod error;
pub mod history;
pub mod presence;
pub mod reconciler;
pub mod record;
pub mod session;
pub mod surface;
pub mod sync;
pub mod threads;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{ActiveReactions, BroadcastChannel, Reaction, ReactionEvent};
pub use client::{InputEvent, LiveClient, Modifiers};
pub use config::LiveConfig;
pub use crdt::{MutationScope, ObjectStore, StorageSnapshot};
pub use cursor::{CursorMachine, CursorMode, CursorState};
pub use error::{SyncError, SyncResult};
pub use history::HistoryManager;
pub use presence::{ConnectionId, PresenceChannel, PresenceRecord, PresenceUpdate, cursor_color};
pub use reconciler::{ReconcileReport, Reconciler, SessionState};
pub use record::{AttributeUpdate, ElementAttributes, ObjectId, ShapeGeometry, ShapeKind, ShapeRecord};
pub use session::{RoomSession, SessionEvent};
pub use surface::{DrawingSurface, MemorySurface, SurfaceEvent};
pub use sync::{ClientMessage, ConnectionState, ServerMessage, SyncEvent};
#[cfg(not(target_arch = "wasm32"))]
pub use sync::PlatformWebSocket;
pub use threads::{ThreadBoard, ThreadMetadata, ThreadMetadataPatch};
