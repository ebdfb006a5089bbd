//! Bridge between the local drawing surface and the shared object store.
//!
//! Local surface events become store writes, one mutation scope per event.
//! Store snapshots are diffed against the surface and applied with surface
//! notifications suppressed, so remote state never echoes back as a local
//! edit. The object the user is editing, and a shape still being drawn, are
//! never touched by a reconciliation pass.
//!
//! The reconciler remembers the record it last aligned with the store for
//! every object. A surface object the store has never held is a local shape
//! whose event is still queued, and a surface object that differs from an
//! unchanged store record carries an unpublished local edit; both are left
//! alone until their event publishes them.

use std::collections::{BTreeMap, BTreeSet};

use crate::crdt::StorageSnapshot;
use crate::error::{SyncError, SyncResult};
use crate::record::{AttributeUpdate, ElementAttributes, ObjectId, ShapeRecord};
use crate::session::RoomSession;
use crate::surface::{DrawingSurface, SurfaceEvent};

/// Mutable interaction state shared across surface event handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Shape the user is drawing right now, not yet committed.
    pub drawing: Option<ObjectId>,
    /// Currently selected object.
    pub selected: Option<ObjectId>,
    /// Whether the selected object is being edited.
    pub editing: bool,
    /// Attribute read-out of the selection.
    pub attributes: Option<ElementAttributes>,
}

impl SessionState {
    pub fn is_drawing(&self) -> bool {
        self.drawing.is_some()
    }

    /// Object currently being edited, if any.
    pub fn editing_object(&self) -> Option<&ObjectId> {
        if self.editing { self.selected.as_ref() } else { None }
    }

    /// Objects a reconciliation pass must leave alone.
    pub fn guarded(&self) -> BTreeSet<ObjectId> {
        self.drawing
            .iter()
            .chain(self.editing_object())
            .cloned()
            .collect()
    }
}

/// Surface mutations performed by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<ObjectId>,
    pub updated: Vec<ObjectId>,
    pub removed: Vec<ObjectId>,
    /// Objects that differ from the store but were protected by the edit guard.
    pub guarded: Vec<ObjectId>,
    /// Objects the surface refused to create or update.
    pub failed: Vec<ObjectId>,
    /// Local objects or edits not yet published to the store.
    pub unpublished: Vec<ObjectId>,
}

impl ReconcileReport {
    /// Whether the pass changed nothing on the surface.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Keeps one drawing surface aligned with the shared store.
#[derive(Debug, Default)]
pub struct Reconciler {
    state: SessionState,
    /// Store record each object held when it last matched the surface.
    aligned: BTreeMap<ObjectId, ShapeRecord>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    // --- Local → shared ---

    /// Handle a lifecycle event from the surface.
    ///
    /// Returns `true` when editing ended and a reconciliation pass is due.
    pub fn on_surface_event<S: DrawingSurface>(
        &mut self,
        event: SurfaceEvent,
        surface: &S,
        session: &mut RoomSession,
    ) -> SyncResult<bool> {
        match event {
            SurfaceEvent::DrawingStarted(id) => {
                self.state.drawing = Some(id);
                Ok(false)
            }
            SurfaceEvent::ObjectCreated(id) | SurfaceEvent::PathCreated(id) => {
                if self.state.drawing.as_ref() == Some(&id) {
                    self.state.drawing = None;
                }
                self.publish(&id, surface, session)?;
                Ok(false)
            }
            SurfaceEvent::ObjectModified(id) | SurfaceEvent::ObjectScaling(id) => {
                self.publish(&id, surface, session)?;
                self.refresh_attributes(&id, surface);
                Ok(false)
            }
            SurfaceEvent::SelectionCreated(id) => {
                let switched = self.state.selected.as_ref() != Some(&id);
                let ended = switched && self.state.editing;
                if switched {
                    self.state.editing = false;
                }
                self.state.selected = Some(id.clone());
                if !self.state.editing {
                    self.refresh_attributes(&id, surface);
                }
                Ok(ended)
            }
            SurfaceEvent::SelectionCleared => {
                let ended = self.state.editing;
                self.state.selected = None;
                self.state.editing = false;
                self.state.attributes = None;
                Ok(ended)
            }
            SurfaceEvent::TextEditingEntered(id) => {
                self.state.selected = Some(id);
                self.state.editing = true;
                Ok(false)
            }
            SurfaceEvent::TextEditingExited(id) => {
                self.publish(&id, surface, session)?;
                Ok(self.end_editing())
            }
        }
    }

    /// Serialize one surface object and store it in its own scope.
    fn publish<S: DrawingSurface>(&self, id: &ObjectId, surface: &S, session: &mut RoomSession) -> SyncResult<()> {
        let Some(record) = surface.record(id) else {
            log::warn!("Surface event for unknown object {}", id);
            return Ok(());
        };
        session.mutate(|scope| {
            scope.set(record);
            Ok(())
        })
    }

    fn refresh_attributes<S: DrawingSurface>(&mut self, id: &ObjectId, surface: &S) {
        if self.state.selected.as_ref() == Some(id) {
            self.state.attributes = surface.record(id).map(|r| ElementAttributes::from_record(&r));
        }
    }

    /// Stop protecting the edited object. Returns whether editing was active.
    pub fn end_editing(&mut self) -> bool {
        std::mem::take(&mut self.state.editing)
    }

    /// Apply a design-panel edit to the selection and store the result.
    ///
    /// The selection counts as being edited from here on.
    pub fn apply_attribute<S: DrawingSurface>(
        &mut self,
        update: &AttributeUpdate,
        surface: &mut S,
        session: &mut RoomSession,
    ) -> SyncResult<()> {
        let id = self
            .state
            .selected
            .clone()
            .or_else(|| surface.selected())
            .ok_or_else(|| SyncError::InvalidAttribute(format!("{} with nothing selected", update.name())))?;
        let Some(mut record) = surface.record(&id) else {
            log::warn!("Selected object {} is not on the surface", id);
            return Ok(());
        };
        update.apply(&mut record)?;

        self.state.selected = Some(id.clone());
        self.state.editing = true;

        surface.set_notifications(false);
        let applied = surface.update_from_record(&record);
        surface.set_notifications(true);
        applied?;

        self.state.attributes = Some(ElementAttributes::from_record(&record));
        session.mutate(|scope| {
            scope.set(record);
            Ok(())
        })
    }

    /// Delete the selected object locally and from the store.
    pub fn delete_selected<S: DrawingSurface>(&mut self, surface: &mut S, session: &mut RoomSession) -> SyncResult<bool> {
        let Some(id) = surface.selected().or_else(|| self.state.selected.clone()) else {
            return Ok(false);
        };
        surface.set_notifications(false);
        surface.remove_object(&id);
        surface.set_notifications(true);
        self.aligned.remove(&id);

        self.state.selected = None;
        self.state.editing = false;
        self.state.attributes = None;

        session.mutate(|scope| {
            scope.delete(&id);
            Ok(())
        })?;
        Ok(true)
    }

    /// Clear the store; clear the surface only if the store ended empty.
    pub fn reset<S: DrawingSurface>(&mut self, surface: &mut S, session: &mut RoomSession) -> SyncResult<bool> {
        let empty = session.mutate(|scope| Ok(scope.clear()))?;
        if empty {
            surface.set_notifications(false);
            surface.clear_all();
            surface.set_notifications(true);
            self.state = SessionState::default();
            self.aligned.clear();
        } else {
            log::warn!("Store not empty after reset; keeping local surface");
        }
        Ok(empty)
    }

    // --- Shared → local ---

    /// Align `surface` with `snapshot`.
    ///
    /// Diffing against the surface's current contents makes repeated passes
    /// over the same snapshot no-ops.
    pub fn reconcile<S: DrawingSurface>(&mut self, snapshot: &StorageSnapshot, surface: &mut S) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let guarded = self.state.guarded();

        surface.set_notifications(false);

        for id in surface.object_ids() {
            if snapshot.contains(&id) {
                continue;
            }
            if !self.aligned.contains_key(&id) {
                log::debug!("Keeping unpublished local object {}", id);
                report.unpublished.push(id);
            } else if guarded.contains(&id) {
                log::debug!("Keeping {} on the surface while it is being edited", id);
                report.guarded.push(id);
            } else {
                self.aligned.remove(&id);
                if surface.remove_object(&id) {
                    report.removed.push(id);
                }
            }
        }

        for (id, record) in &snapshot.records {
            let current = surface.record(id);
            if current.as_ref() == Some(record) {
                self.aligned.insert(id.clone(), record.clone());
                continue;
            }
            if guarded.contains(id) {
                report.guarded.push(id.clone());
                continue;
            }
            if current.is_some() && self.aligned.get(id) == Some(record) {
                report.unpublished.push(id.clone());
                continue;
            }
            let applied = match current {
                None => surface.create_from_record(record).map(|_| true),
                Some(_) => surface.update_from_record(record).map(|_| false),
            };
            match applied {
                Ok(created) => {
                    self.aligned.insert(id.clone(), record.clone());
                    if created {
                        report.created.push(id.clone());
                    } else {
                        report.updated.push(id.clone());
                    }
                }
                Err(e) => {
                    log::warn!("Failed to apply {} to the surface: {}", id, e);
                    report.failed.push(id.clone());
                }
            }
        }

        surface.set_notifications(true);

        let on_surface: BTreeSet<ObjectId> = surface.object_ids().into_iter().collect();
        self.aligned
            .retain(|id, _| snapshot.contains(id) || on_surface.contains(id));

        if !snapshot.malformed.is_empty() {
            log::debug!("Left {} malformed objects untouched", snapshot.malformed.len());
        }
        if let Some(id) = self.state.selected.clone() {
            if !on_surface.contains(&id) {
                self.state.selected = None;
                self.state.attributes = None;
            } else if !self.state.editing {
                self.refresh_attributes(&id, &*surface);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::ObjectStore;
    use crate::record::{SerializableColor, ShapeRecord};
    use crate::surface::MemorySurface;
    use kurbo::Point;

    fn rect(id: &str, x: f64) -> ShapeRecord {
        ShapeRecord::rectangle(id, Point::new(x, 0.0), 10.0, 10.0)
    }

    fn store_with(records: &[ShapeRecord]) -> ObjectStore {
        let mut store = ObjectStore::new();
        store
            .mutate(|scope| {
                for r in records {
                    scope.set(r.clone());
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_reconcile_creates_updates_removes() {
        let mut reconciler = Reconciler::new();
        let mut surface = MemorySurface::new();
        let before = store_with(&[rect("stale", 0.0), rect("moved", 0.0)]);
        reconciler.reconcile(&before.snapshot(), &mut surface);

        let store = store_with(&[rect("moved", 9.0), rect("new", 1.0)]);
        let report = reconciler.reconcile(&store.snapshot(), &mut surface);

        assert_eq!(report.created, vec![ObjectId::from("new")]);
        assert_eq!(report.updated, vec![ObjectId::from("moved")]);
        assert_eq!(report.removed, vec![ObjectId::from("stale")]);
        assert_eq!(surface.get(&"moved".into()), Some(&rect("moved", 9.0)));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut reconciler = Reconciler::new();
        let mut surface = MemorySurface::new();
        let snapshot = store_with(&[rect("a", 0.0), rect("b", 1.0)]).snapshot();

        assert!(!reconciler.reconcile(&snapshot, &mut surface).is_noop());
        let mutations = surface.mutations();
        assert!(reconciler.reconcile(&snapshot, &mut surface).is_noop());
        assert_eq!(surface.mutations(), mutations);
        assert_eq!(surface.len(), 2);
    }

    #[test]
    fn test_reconcile_raises_no_notifications() {
        let mut reconciler = Reconciler::new();
        let mut surface = MemorySurface::new();
        surface.take_events();
        let snapshot = store_with(&[rect("a", 0.0)]).snapshot();
        reconciler.reconcile(&snapshot, &mut surface);
        assert!(surface.take_events().is_empty());
    }

    #[test]
    fn test_editing_guard() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();
        surface.draw(rect("x", 0.0));
        surface.select(&"x".into());
        for event in surface.take_events() {
            reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        }
        reconciler
            .on_surface_event(SurfaceEvent::TextEditingEntered("x".into()), &surface, &mut session)
            .unwrap();

        reconciler.reconcile(&session.store().snapshot(), &mut surface);

        // Remote delete arrives while editing.
        let empty = ObjectStore::new().snapshot();
        let report = reconciler.reconcile(&empty, &mut surface);
        assert_eq!(report.guarded, vec![ObjectId::from("x")]);
        assert!(surface.contains(&"x".into()));

        // Editing ends: remote state wins.
        assert!(reconciler.end_editing());
        let report = reconciler.reconcile(&empty, &mut surface);
        assert_eq!(report.removed, vec![ObjectId::from("x")]);
        assert!(!surface.contains(&"x".into()));
    }

    #[test]
    fn test_in_progress_drawing_is_kept() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();
        let event = surface.begin_draw(rect("draft", 0.0));
        reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        assert!(reconciler.state().is_drawing());

        let report = reconciler.reconcile(&ObjectStore::new().snapshot(), &mut surface);
        assert!(report.removed.is_empty());
        assert!(surface.contains(&"draft".into()));

        let event = surface.draw(rect("draft", 0.0));
        reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        assert!(!reconciler.state().is_drawing());
        assert!(session.store().get(&"draft".into()).is_some());
    }

    #[test]
    fn test_local_events_write_store() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();

        let event = surface.draw(rect("r1", 0.0));
        reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        assert_eq!(session.store().get(&"r1".into()), Some(rect("r1", 0.0)));

        let event = surface.modify(rect("r1", 40.0));
        reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        assert_eq!(session.store().get(&"r1".into()), Some(rect("r1", 40.0)));

        // Unknown ids are ignored.
        reconciler
            .on_surface_event(SurfaceEvent::ObjectModified("ghost".into()), &surface, &mut session)
            .unwrap();
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn test_apply_attribute_marks_editing() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();
        surface.draw(rect("r1", 0.0));
        surface.select(&"r1".into());
        for event in surface.take_events() {
            reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        }

        let fill = SerializableColor::from_hex("#112233").unwrap();
        reconciler
            .apply_attribute(&AttributeUpdate::SetFill(fill), &mut surface, &mut session)
            .unwrap();

        assert!(reconciler.state().editing);
        assert!(surface.take_events().is_empty());
        assert_eq!(
            session.store().get(&"r1".into()).unwrap().style.fill_color,
            Some(fill)
        );
        assert_eq!(
            reconciler.state().attributes.as_ref().unwrap().fill.as_deref(),
            Some("#112233")
        );

        // Deselecting ends editing and asks for a pass.
        assert!(
            reconciler
                .on_surface_event(SurfaceEvent::SelectionCleared, &surface, &mut session)
                .unwrap()
        );
    }

    #[test]
    fn test_apply_attribute_rejects_mismatch() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();
        assert!(
            reconciler
                .apply_attribute(&AttributeUpdate::SetWidth(5.0), &mut surface, &mut session)
                .is_err()
        );

        surface.draw(rect("r1", 0.0));
        surface.select(&"r1".into());
        let err = reconciler
            .apply_attribute(&AttributeUpdate::SetFontSize(20.0), &mut surface, &mut session)
            .unwrap_err();
        assert!(matches!(err, SyncError::AttributeMismatch { .. }));
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_delete_and_reset() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();
        for id in ["a", "b"] {
            let event = surface.draw(rect(id, 0.0));
            reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        }

        surface.select(&"a".into());
        assert!(reconciler.delete_selected(&mut surface, &mut session).unwrap());
        assert!(!surface.contains(&"a".into()));
        assert!(session.store().get(&"a".into()).is_none());
        assert!(!reconciler.delete_selected(&mut surface, &mut session).unwrap());

        assert!(reconciler.reset(&mut surface, &mut session).unwrap());
        assert!(surface.is_empty());
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_unpublished_local_objects_survive() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();

        // Two shapes drawn before either event is handled.
        let first = surface.draw(rect("r1", 0.0));
        let second = surface.draw(rect("r2", 5.0));

        reconciler.on_surface_event(first, &surface, &mut session).unwrap();
        let report = reconciler.reconcile(&session.store().snapshot(), &mut surface);
        assert_eq!(report.unpublished, vec![ObjectId::from("r2")]);
        assert!(report.removed.is_empty());
        assert!(surface.contains(&"r2".into()));

        reconciler.on_surface_event(second, &surface, &mut session).unwrap();
        assert_eq!(session.store().get(&"r2".into()), Some(rect("r2", 5.0)));
    }

    #[test]
    fn test_unpublished_local_edit_is_kept() {
        let mut reconciler = Reconciler::new();
        let mut session = RoomSession::default();
        let mut surface = MemorySurface::new();
        let event = surface.draw(rect("r1", 0.0));
        reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        reconciler.reconcile(&session.store().snapshot(), &mut surface);

        // Moved locally, event still queued.
        let event = surface.modify(rect("r1", 30.0));
        let report = reconciler.reconcile(&session.store().snapshot(), &mut surface);
        assert_eq!(report.unpublished, vec![ObjectId::from("r1")]);
        assert_eq!(surface.get(&"r1".into()), Some(&rect("r1", 30.0)));

        reconciler.on_surface_event(event, &surface, &mut session).unwrap();
        assert_eq!(session.store().get(&"r1".into()), Some(rect("r1", 30.0)));
    }

    #[test]
    fn test_store_deletion_removes_known_object() {
        let mut reconciler = Reconciler::new();
        let mut surface = MemorySurface::new();
        reconciler.reconcile(&store_with(&[rect("r1", 0.0)]).snapshot(), &mut surface);
        assert!(surface.contains(&"r1".into()));

        let report = reconciler.reconcile(&ObjectStore::new().snapshot(), &mut surface);
        assert_eq!(report.removed, vec![ObjectId::from("r1")]);
        assert!(surface.is_empty());
    }

    #[test]
    fn test_malformed_records_left_alone() {
        let mut reconciler = Reconciler::new();
        let mut surface = MemorySurface::new();
        surface.create_from_record(&rect("bad", 0.0)).unwrap();

        let mut snapshot = store_with(&[rect("good", 0.0)]).snapshot();
        snapshot.malformed.insert("bad".into());
        snapshot.malformed.insert("missing".into());

        let report = reconciler.reconcile(&snapshot, &mut surface);
        assert_eq!(report.created, vec![ObjectId::from("good")]);
        assert!(report.removed.is_empty());
        assert!(surface.contains(&"bad".into()));
        assert!(!surface.contains(&"missing".into()));
    }
}
