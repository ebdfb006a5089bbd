//! Boundary to the local drawing surface.
//!
//! The scene-graph library that actually renders and hit-tests shapes sits
//! behind [`DrawingSurface`]. Its callbacks reach the engine as typed
//! [`SurfaceEvent`] messages instead of closures over shared state.

mod memory;

pub use memory::MemorySurface;

use kurbo::Size;

use crate::error::SyncResult;
use crate::record::{ObjectId, ShapeRecord};

/// Lifecycle notifications raised by the drawing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The user started drawing a shape that is not committed yet.
    DrawingStarted(ObjectId),
    /// A drawn shape was completed.
    ObjectCreated(ObjectId),
    /// An object was moved, rotated or restyled.
    ObjectModified(ObjectId),
    /// An object is being resized.
    ObjectScaling(ObjectId),
    /// A freehand path was completed.
    PathCreated(ObjectId),
    SelectionCreated(ObjectId),
    SelectionCleared,
    /// In-place text editing started on an object.
    TextEditingEntered(ObjectId),
    TextEditingExited(ObjectId),
}

/// A local scene graph the engine can read from and apply remote state to.
pub trait DrawingSurface {
    /// Ids of every object currently on the surface.
    fn object_ids(&self) -> Vec<ObjectId>;

    /// Serialize one object to its shared record form.
    fn record(&self, id: &ObjectId) -> Option<ShapeRecord>;

    /// Instantiate an object from a record.
    fn create_from_record(&mut self, record: &ShapeRecord) -> SyncResult<()>;

    /// Replace an existing object's state with `record`, keeping its selection.
    fn update_from_record(&mut self, record: &ShapeRecord) -> SyncResult<()>;

    /// Remove an object. Returns whether it was present.
    fn remove_object(&mut self, id: &ObjectId) -> bool;

    fn clear_all(&mut self);

    fn resize(&mut self, size: Size);

    /// Currently selected object, if any.
    fn selected(&self) -> Option<ObjectId>;

    /// Enable or disable lifecycle notifications.
    ///
    /// Disabled while remote state is applied so those writes never come back
    /// as local edits.
    fn set_notifications(&mut self, enabled: bool);
}
