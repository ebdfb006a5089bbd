//! CRDT-backed shared object store.
//!
//! # Schema
//!
//! The Loro document has the following structure:
//! ```text
//! LoroDoc
//! └── "canvas_objects": LoroMap<ObjectId, LoroMap> (one map per shape record)
//! ```
//!
//! Each record map holds:
//! - "type": String ("rectangle", "ellipse", "triangle", "line", "path", "text", "image")
//! - "id": String (object id)
//! - Kind-specific geometry fields (position, dimensions, points, font, source)
//! - Style fields (stroke color/width, optional fill color)

mod convert;
mod schema;

pub use convert::{record_from_loro, record_to_loro};
pub use schema::{
    MutationScope, OBJECTS_KEY, ObjectStore, RecordChange, StorageSnapshot, diff_snapshots,
};

// Re-export Loro types that may be useful for collaboration
pub use loro::{ExportMode, VersionVector};
