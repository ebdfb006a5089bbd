//! In-memory drawing surface for headless use and tests.

use std::collections::BTreeMap;

use kurbo::Size;

use super::{DrawingSurface, SurfaceEvent};
use crate::error::{SyncError, SyncResult};
use crate::record::{ObjectId, ShapeRecord};

/// A drawing surface that keeps shapes as records.
///
/// Every mutation raises the notification a real scene graph would, unless
/// notifications are disabled. Raised notifications are queued so callers can
/// forward them (or assert that none were raised).
#[derive(Debug, Clone)]
pub struct MemorySurface {
    objects: BTreeMap<ObjectId, ShapeRecord>,
    selected: Option<ObjectId>,
    size: Size,
    notifications: bool,
    events: Vec<SurfaceEvent>,
    mutations: usize,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            selected: None,
            size: Size::ZERO,
            notifications: true,
            events: Vec::new(),
            mutations: 0,
        }
    }
}

impl MemorySurface {
    /// Create a new empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&mut self, event: SurfaceEvent) {
        if self.notifications {
            self.events.push(event);
        }
    }

    /// Drain queued notifications.
    pub fn take_events(&mut self) -> Vec<SurfaceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&ShapeRecord> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Number of create/update/remove/clear calls applied so far.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    /// The user finished drawing `record`.
    pub fn draw(&mut self, record: ShapeRecord) -> SurfaceEvent {
        let id = record.object_id.clone();
        self.objects.insert(id.clone(), record);
        let event = SurfaceEvent::ObjectCreated(id);
        self.notify(event.clone());
        event
    }

    /// The user started drawing `record`; it stays local until completed.
    pub fn begin_draw(&mut self, record: ShapeRecord) -> SurfaceEvent {
        let id = record.object_id.clone();
        self.objects.insert(id.clone(), record);
        let event = SurfaceEvent::DrawingStarted(id);
        self.notify(event.clone());
        event
    }

    /// The user moved or restyled an object by hand.
    pub fn modify(&mut self, record: ShapeRecord) -> SurfaceEvent {
        let id = record.object_id.clone();
        self.objects.insert(id.clone(), record);
        let event = SurfaceEvent::ObjectModified(id);
        self.notify(event.clone());
        event
    }

    /// The user clicked an object.
    pub fn select(&mut self, id: &ObjectId) -> Option<SurfaceEvent> {
        if !self.objects.contains_key(id) {
            return None;
        }
        self.selected = Some(id.clone());
        let event = SurfaceEvent::SelectionCreated(id.clone());
        self.notify(event.clone());
        Some(event)
    }

    /// The user clicked empty canvas.
    pub fn deselect(&mut self) -> SurfaceEvent {
        self.selected = None;
        let event = SurfaceEvent::SelectionCleared;
        self.notify(event.clone());
        event
    }
}

impl DrawingSurface for MemorySurface {
    fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().cloned().collect()
    }

    fn record(&self, id: &ObjectId) -> Option<ShapeRecord> {
        self.objects.get(id).cloned()
    }

    fn create_from_record(&mut self, record: &ShapeRecord) -> SyncResult<()> {
        if self.objects.contains_key(&record.object_id) {
            return Err(SyncError::Surface(format!(
                "object {} already exists",
                record.object_id
            )));
        }
        self.objects.insert(record.object_id.clone(), record.clone());
        self.mutations += 1;
        self.notify(SurfaceEvent::ObjectCreated(record.object_id.clone()));
        Ok(())
    }

    fn update_from_record(&mut self, record: &ShapeRecord) -> SyncResult<()> {
        let Some(existing) = self.objects.get_mut(&record.object_id) else {
            return Err(SyncError::Surface(format!(
                "object {} not found",
                record.object_id
            )));
        };
        *existing = record.clone();
        self.mutations += 1;
        self.notify(SurfaceEvent::ObjectModified(record.object_id.clone()));
        Ok(())
    }

    fn remove_object(&mut self, id: &ObjectId) -> bool {
        if self.objects.remove(id).is_none() {
            return false;
        }
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.mutations += 1;
        true
    }

    fn clear_all(&mut self) {
        self.objects.clear();
        self.selected = None;
        self.mutations += 1;
    }

    fn resize(&mut self, size: Size) {
        self.size = size;
    }

    fn selected(&self) -> Option<ObjectId> {
        self.selected.clone()
    }

    fn set_notifications(&mut self, enabled: bool) {
        self.notifications = enabled;
    }
}
