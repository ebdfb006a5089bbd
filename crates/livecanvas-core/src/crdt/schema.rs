//! Shared object store backed by a Loro document.

use std::collections::{BTreeMap, BTreeSet};

use loro::{ExportMode, LoroDoc, LoroMap, LoroValue};

use super::convert::{record_from_loro, record_to_loro};
use crate::error::SyncResult;
use crate::record::{ObjectId, ShapeRecord};

/// Key for the object map in the document.
pub const OBJECTS_KEY: &str = "canvas_objects";

/// Full decoded view of the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageSnapshot {
    /// Every record that decoded cleanly.
    pub records: BTreeMap<ObjectId, ShapeRecord>,
    /// Keys whose records are present but could not be decoded.
    pub malformed: BTreeSet<ObjectId>,
}

impl StorageSnapshot {
    /// Whether `id` is present in the store, decodable or not.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.records.contains_key(id) || self.malformed.contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Before/after images of one object touched by a mutation scope.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub object_id: ObjectId,
    pub before: Option<ShapeRecord>,
    pub after: Option<ShapeRecord>,
}

/// Compute the per-object changes between two snapshots.
pub fn diff_snapshots(before: &StorageSnapshot, after: &StorageSnapshot) -> Vec<RecordChange> {
    let ids: BTreeSet<&ObjectId> = before.records.keys().chain(after.records.keys()).collect();
    ids.into_iter()
        .filter_map(|id| {
            let old = before.records.get(id);
            let new = after.records.get(id);
            (old != new).then(|| RecordChange {
                object_id: id.clone(),
                before: old.cloned(),
                after: new.cloned(),
            })
        })
        .collect()
}

/// Transactional write access to the store.
///
/// Writes are staged and only reach the document when the scope's closure
/// returns `Ok`, so a scope is applied entirely or not at all.
pub struct MutationScope<'a> {
    base: &'a StorageSnapshot,
    staged: BTreeMap<ObjectId, Option<ShapeRecord>>,
}

impl<'a> MutationScope<'a> {
    fn new(base: &'a StorageSnapshot) -> Self {
        Self {
            base,
            staged: BTreeMap::new(),
        }
    }

    /// Current record for `id`, including writes staged in this scope.
    pub fn get(&self, id: &ObjectId) -> Option<&ShapeRecord> {
        match self.staged.get(id) {
            Some(staged) => staged.as_ref(),
            None => self.base.records.get(id),
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        match self.staged.get(id) {
            Some(staged) => staged.is_some(),
            None => self.base.contains(id),
        }
    }

    /// Store the full record under its object id (last writer wins).
    pub fn set(&mut self, record: ShapeRecord) {
        self.staged.insert(record.object_id.clone(), Some(record));
    }

    /// Delete `id`. Deleting an absent object is a no-op.
    pub fn delete(&mut self, id: &ObjectId) {
        if self.contains(id) {
            self.staged.insert(id.clone(), None);
        }
    }

    /// Delete every object. Returns whether the store ends up empty.
    pub fn clear(&mut self) -> bool {
        for id in self.ids() {
            self.staged.insert(id, None);
        }
        self.is_empty()
    }

    /// Ids of every object visible in this scope.
    pub fn ids(&self) -> Vec<ObjectId> {
        let base = self.base.records.keys().chain(self.base.malformed.iter());
        let staged = self.staged.keys();
        base.chain(staged)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|id| self.contains(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every decodable record visible in this scope.
    pub fn for_each(&self, mut f: impl FnMut(&ShapeRecord)) {
        for id in self.ids() {
            if let Some(record) = self.get(&id) {
                f(record);
            }
        }
    }
}

/// The shared object store replica held by one client.
///
/// Wraps a `LoroDoc` whose `canvas_objects` map holds one nested map per
/// object. Concurrent writes to the same key resolve last-writer-wins inside
/// Loro, so every replica converges on exactly one record per object.
pub struct ObjectStore {
    doc: LoroDoc,
}

impl ObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// Get the underlying LoroDoc.
    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    fn objects_map(&self) -> LoroMap {
        self.doc.get_map(OBJECTS_KEY)
    }

    /// Decode the whole store.
    ///
    /// Records that fail to decode are listed in `malformed` and logged; they
    /// never prevent the rest of the snapshot from being read.
    pub fn snapshot(&self) -> StorageSnapshot {
        let mut snapshot = StorageSnapshot::default();
        let LoroValue::Map(objects) = self.objects_map().get_deep_value() else {
            return snapshot;
        };

        for (key, value) in objects.iter() {
            let id = ObjectId::new(key.clone());
            let decoded = match value {
                LoroValue::Map(map) => record_from_loro(&id, map),
                _ => Err(crate::error::SyncError::MalformedRecord {
                    object_id: id.clone(),
                    reason: "value is not a map".to_string(),
                }),
            };
            match decoded {
                Ok(record) => {
                    snapshot.records.insert(id, record);
                }
                Err(e) => {
                    log::warn!("Skipping object {}: {}", id, e);
                    snapshot.malformed.insert(id);
                }
            }
        }

        snapshot
    }

    /// Get a record by id. Absent and malformed records both yield `None`.
    pub fn get(&self, id: &ObjectId) -> Option<ShapeRecord> {
        let LoroValue::Map(objects) = self.objects_map().get_deep_value() else {
            return None;
        };
        match objects.get(id.as_str())? {
            LoroValue::Map(map) => record_from_loro(id, map)
                .map_err(|e| log::warn!("Cannot read object {}: {}", id, e))
                .ok(),
            _ => None,
        }
    }

    /// Number of objects in the store.
    pub fn len(&self) -> usize {
        self.objects_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` as one atomic mutation scope and commit its writes.
    ///
    /// Returns the closure's value together with the changes the scope made.
    /// When `f` fails nothing is written.
    pub fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut MutationScope<'_>) -> SyncResult<T>,
    ) -> SyncResult<(T, Vec<RecordChange>)> {
        let base = self.snapshot();
        let mut scope = MutationScope::new(&base);
        let value = f(&mut scope)?;
        let staged = scope.staged;

        let objects = self.objects_map();
        let mut changes = Vec::new();
        for (id, after) in staged {
            let before = base.records.get(&id).cloned();
            if before == after && !base.malformed.contains(&id) {
                continue;
            }
            match &after {
                Some(record) => {
                    if base.contains(&id) {
                        objects.delete(id.as_str())?;
                    }
                    let map = objects.insert_container(id.as_str(), LoroMap::new())?;
                    record_to_loro(record, &map)?;
                }
                None => objects.delete(id.as_str())?,
            }
            changes.push(RecordChange {
                object_id: id,
                before,
                after,
            });
        }

        if !changes.is_empty() {
            self.doc.commit();
        }
        Ok((value, changes))
    }

    /// Export the document as a snapshot (full state).
    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc.export(ExportMode::Snapshot).unwrap_or_default()
    }

    /// Merge remote state and report which objects changed as a result.
    pub fn import(&mut self, bytes: &[u8]) -> SyncResult<Vec<RecordChange>> {
        let before = self.snapshot();
        self.doc.import(bytes)?;
        let after = self.snapshot();
        Ok(diff_snapshots(&before, &after))
    }

    /// Merge remote state without decoding it.
    ///
    /// Used where only the combined document matters, such as a relay
    /// keeping the room's state for late joiners.
    pub fn merge(&mut self, bytes: &[u8]) -> SyncResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    /// Get the current version vector.
    pub fn version(&self) -> loro::VersionVector {
        self.doc.oplog_vv()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}
