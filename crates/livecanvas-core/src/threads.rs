//! Positional comment-thread metadata and z-ordering.
//!
//! Thread contents live with the relay; this module only tracks where each
//! thread is pinned, whether it is resolved, and its stacking order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type ThreadId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub x: f64,
    pub y: f64,
    pub z_index: i64,
    pub resolved: bool,
}

/// Field-level edit of thread metadata. Absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
}

impl ThreadMetadataPatch {
    pub fn apply(&self, metadata: &mut ThreadMetadata) {
        if let Some(x) = self.x {
            metadata.x = x;
        }
        if let Some(y) = self.y {
            metadata.y = y;
        }
        if let Some(z) = self.z_index {
            metadata.z_index = z;
        }
        if let Some(resolved) = self.resolved {
            metadata.resolved = resolved;
        }
    }
}

/// Highest z-index among `threads`, or 0 when there are none.
pub fn max_z_index<'a>(threads: impl IntoIterator<Item = &'a ThreadMetadata>) -> i64 {
    threads.into_iter().map(|t| t.z_index).max().unwrap_or(0)
}

/// Local replica of the room's thread metadata.
///
/// Local edits are applied optimistically and returned for the caller to send;
/// the relay's `thread_updated` echo then overwrites with the stored value.
/// Raising a thread reads the current max and writes `max + 1` with no
/// compare-and-swap, so two peers raising at once may land on the same value.
#[derive(Debug, Clone, Default)]
pub struct ThreadBoard {
    threads: BTreeMap<ThreadId, ThreadMetadata>,
}

impl ThreadBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, thread_id: &str) -> Option<&ThreadMetadata> {
        self.threads.get(thread_id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn max_z_index(&self) -> i64 {
        max_z_index(self.threads.values())
    }

    /// Pin a new unresolved thread at (x, y) on top of all others.
    pub fn create(&mut self, x: f64, y: f64) -> (ThreadId, ThreadMetadata) {
        let thread_id = uuid::Uuid::new_v4().to_string();
        let metadata = ThreadMetadata {
            x,
            y,
            z_index: self.max_z_index() + 1,
            resolved: false,
        };
        self.threads.insert(thread_id.clone(), metadata);
        (thread_id, metadata)
    }

    /// Unresolved threads for the overlay, bottom-most first.
    pub fn unresolved(&self) -> Vec<(&str, &ThreadMetadata)> {
        let mut list: Vec<_> = self
            .threads
            .iter()
            .filter(|(_, t)| !t.resolved)
            .map(|(id, t)| (id.as_str(), t))
            .collect();
        list.sort_by_key(|(id, t)| (t.z_index, *id));
        list
    }

    /// Raise a focused thread above every other.
    ///
    /// Returns `None` when the thread is unknown or already holds the max.
    pub fn bring_to_front(&mut self, thread_id: &str) -> Option<ThreadMetadataPatch> {
        let max = self.max_z_index();
        let thread = self.threads.get_mut(thread_id)?;
        if thread.z_index == max {
            return None;
        }
        let patch = ThreadMetadataPatch {
            z_index: Some(max + 1),
            ..Default::default()
        };
        patch.apply(thread);
        Some(patch)
    }

    /// Apply a local edit. Returns `None` for unknown threads.
    pub fn edit(&mut self, thread_id: &str, patch: ThreadMetadataPatch) -> Option<ThreadMetadataPatch> {
        let thread = self.threads.get_mut(thread_id)?;
        patch.apply(thread);
        Some(patch)
    }

    /// Store metadata published by the relay.
    pub fn apply_remote(&mut self, thread_id: ThreadId, metadata: ThreadMetadata) {
        self.threads.insert(thread_id, metadata);
    }

    /// Replace everything with the relay's list (on join).
    pub fn replace_all(&mut self, threads: BTreeMap<ThreadId, ThreadMetadata>) {
        self.threads = threads;
    }
}
