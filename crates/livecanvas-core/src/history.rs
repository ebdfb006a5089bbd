//! Shared undo/redo over the object store.
//!
//! Every mutation scope that changes the store is recorded here in the order
//! it was observed, whether this client or a remote peer authored it. `undo`
//! always reverts the most recent scope, regardless of author.

use std::collections::VecDeque;

use crate::crdt::{ObjectStore, RecordChange};
use crate::error::SyncResult;

/// Who produced a recorded scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOrigin {
    Local,
    Remote,
}

/// One undoable unit: the changes of a single mutation scope.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    origin: ScopeOrigin,
    changes: Vec<RecordChange>,
}

impl HistoryEntry {
    pub fn origin(&self) -> ScopeOrigin {
        self.origin
    }
}

/// Undo/redo stacks over store mutation scopes.
#[derive(Debug)]
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_steps: usize,
}

impl HistoryManager {
    pub fn new(max_steps: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_steps: max_steps.max(1),
        }
    }

    /// Record a committed scope. Empty scopes are ignored.
    pub fn record(&mut self, origin: ScopeOrigin, changes: Vec<RecordChange>) {
        if changes.is_empty() {
            return;
        }
        self.undo_stack.push_back(HistoryEntry { origin, changes });
        if self.undo_stack.len() > self.max_steps {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Origin of the scope `undo` would revert next.
    pub fn peek_undo(&self) -> Option<ScopeOrigin> {
        self.undo_stack.back().map(HistoryEntry::origin)
    }

    /// Revert the most recent scope.
    ///
    /// Returns the changes written to the store, or `None` when there is
    /// nothing to undo. The revert itself is not recorded as a new scope.
    pub fn undo(&mut self, store: &mut ObjectStore) -> SyncResult<Option<Vec<RecordChange>>> {
        let Some(entry) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        match apply_images(store, &entry, |c| c.before.clone()) {
            Ok(applied) => {
                log::debug!("Undid {:?} scope touching {} objects", entry.origin, entry.changes.len());
                self.redo_stack.push(entry);
                Ok(Some(applied))
            }
            Err(e) => {
                self.undo_stack.push_back(entry);
                Err(e)
            }
        }
    }

    /// Re-apply the most recently undone scope.
    pub fn redo(&mut self, store: &mut ObjectStore) -> SyncResult<Option<Vec<RecordChange>>> {
        let Some(entry) = self.redo_stack.pop() else {
            return Ok(None);
        };
        match apply_images(store, &entry, |c| c.after.clone()) {
            Ok(applied) => {
                self.undo_stack.push_back(entry);
                Ok(Some(applied))
            }
            Err(e) => {
                self.redo_stack.push(entry);
                Err(e)
            }
        }
    }

    /// Drop all recorded history (e.g. after rejoining a room).
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

/// Write one side of an entry's images back into the store as a single scope.
fn apply_images(
    store: &mut ObjectStore,
    entry: &HistoryEntry,
    image: impl Fn(&RecordChange) -> Option<crate::record::ShapeRecord>,
) -> SyncResult<Vec<RecordChange>> {
    let (_, applied) = store.mutate(|scope| {
        for change in entry.changes.iter().rev() {
            match image(change) {
                Some(record) => scope.set(record),
                None => scope.delete(&change.object_id),
            }
        }
        Ok(())
    })?;
    Ok(applied)
}
