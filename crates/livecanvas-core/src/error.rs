//! Error types for the synchronization engine.

use crate::record::{ObjectId, ShapeKind};
use thiserror::Error;

/// Errors raised by the synchronization engine.
///
/// Most of these never reach the user: the session layer logs them and keeps
/// applying local state optimistically.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("CRDT error: {0}")]
    Crdt(String),
    #[error("Malformed record {object_id}: {reason}")]
    MalformedRecord { object_id: ObjectId, reason: String },
    #[error("Attribute {attribute} does not apply to {kind:?} shapes")]
    AttributeMismatch {
        attribute: &'static str,
        kind: ShapeKind,
    },
    #[error("Invalid attribute value: {0}")]
    InvalidAttribute(String),
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Drawing surface error: {0}")]
    Surface(String),
    #[error("Not in a room")]
    NotInRoom,
}

impl From<loro::LoroError> for SyncError {
    fn from(err: loro::LoroError) -> Self {
        SyncError::Crdt(err.to_string())
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
