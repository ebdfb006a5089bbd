//! Per-connection ephemeral presence (cursor and chat message).
//!
//! Each connection owns exactly one [`PresenceRecord`] and publishes it whole;
//! peers' records are kept here keyed by their relay-assigned connection id.
//! Presence never enters the object store or the undo history.

use std::collections::BTreeMap;

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Relay-assigned numeric id of one connection in a room.
pub type ConnectionId = u64;

/// Palette for remote cursors, indexed by connection id.
pub const CURSOR_COLORS: [&str; 8] = [
    "#E57373", "#9575CD", "#4FC3F7", "#81C784", "#FFF176", "#FF8A65", "#F06292", "#7986CB",
];

/// Cursor color for a connection.
pub fn cursor_color(connection_id: ConnectionId) -> &'static str {
    CURSOR_COLORS[(connection_id % CURSOR_COLORS.len() as u64) as usize]
}

/// Presence state for one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Cursor position in canvas coordinates, `None` when off-canvas.
    pub cursor: Option<Point>,
    /// Chat text shown next to the cursor.
    pub message: Option<String>,
}

/// Field-level partial update of a presence record.
///
/// An outer `None` leaves the field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceUpdate {
    pub cursor: Option<Option<Point>>,
    pub message: Option<Option<String>>,
}

impl PresenceUpdate {
    pub fn cursor(cursor: Option<Point>) -> Self {
        Self {
            cursor: Some(cursor),
            ..Default::default()
        }
    }

    pub fn message(message: Option<String>) -> Self {
        Self {
            message: Some(message),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = Some(message);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_none() && self.message.is_none()
    }
}

/// Own presence plus the latest record published by every other peer.
#[derive(Debug, Default)]
pub struct PresenceChannel {
    me: PresenceRecord,
    others: BTreeMap<ConnectionId, PresenceRecord>,
    /// Set when `me` changed and has not been published yet.
    dirty: bool,
}

impl PresenceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our own presence record.
    pub fn me(&self) -> &PresenceRecord {
        &self.me
    }

    /// Merge `update` into our record. Returns whether anything changed.
    pub fn update(&mut self, update: PresenceUpdate) -> bool {
        let mut changed = false;
        if let Some(cursor) = update.cursor {
            if self.me.cursor != cursor {
                self.me.cursor = cursor;
                changed = true;
            }
        }
        if let Some(message) = update.message {
            if self.me.message != message {
                self.me.message = message;
                changed = true;
            }
        }
        self.dirty |= changed;
        changed
    }

    /// Take our record for publishing if it changed since the last call.
    pub fn take_pending(&mut self) -> Option<PresenceRecord> {
        if std::mem::take(&mut self.dirty) {
            Some(self.me.clone())
        } else {
            None
        }
    }

    /// Mark our record for republishing (e.g. after joining a room).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Store the record a peer published. Replaces any previous record.
    pub fn apply_remote(&mut self, from: ConnectionId, record: PresenceRecord) {
        self.others.insert(from, record);
    }

    /// Forget a peer that left.
    pub fn remove_peer(&mut self, connection_id: ConnectionId) -> Option<PresenceRecord> {
        self.others.remove(&connection_id)
    }

    /// Forget every peer.
    pub fn clear_others(&mut self) {
        self.others.clear();
    }

    /// Every other peer's presence, ordered by connection id.
    pub fn others(&self) -> impl Iterator<Item = (ConnectionId, &PresenceRecord)> {
        self.others.iter().map(|(id, record)| (*id, record))
    }

    pub fn other(&self, connection_id: ConnectionId) -> Option<&PresenceRecord> {
        self.others.get(&connection_id)
    }

    pub fn other_count(&self) -> usize {
        self.others.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_only_touches_given_fields() {
        let mut presence = PresenceChannel::new();
        presence.update(
            PresenceUpdate::cursor(Some(Point::new(1.0, 2.0))).with_message(Some("hi".to_string())),
        );

        presence.update(PresenceUpdate::cursor(None));
        assert_eq!(presence.me().cursor, None);
        assert_eq!(presence.me().message.as_deref(), Some("hi"));
    }

    #[test]
    fn test_pending_only_after_change() {
        let mut presence = PresenceChannel::new();
        assert!(presence.take_pending().is_none());

        assert!(presence.update(PresenceUpdate::cursor(Some(Point::new(3.0, 4.0)))));
        let published = presence.take_pending().unwrap();
        assert_eq!(published.cursor, Some(Point::new(3.0, 4.0)));
        assert!(presence.take_pending().is_none());

        // Same value again is not a change.
        assert!(!presence.update(PresenceUpdate::cursor(Some(Point::new(3.0, 4.0)))));
        assert!(presence.take_pending().is_none());
    }

    #[test]
    fn test_others_replace_and_remove() {
        let mut presence = PresenceChannel::new();
        presence.apply_remote(7, PresenceRecord::default());
        presence.apply_remote(
            7,
            PresenceRecord {
                cursor: Some(Point::new(5.0, 5.0)),
                message: None,
            },
        );
        presence.apply_remote(2, PresenceRecord::default());

        let ids: Vec<_> = presence.others().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 7]);
        assert_eq!(presence.other(7).unwrap().cursor, Some(Point::new(5.0, 5.0)));

        assert!(presence.remove_peer(7).is_some());
        assert_eq!(presence.other_count(), 1);
    }

    #[test]
    fn test_cursor_color_wraps() {
        assert_eq!(cursor_color(0), CURSOR_COLORS[0]);
        assert_eq!(cursor_color(CURSOR_COLORS.len() as u64 + 1), CURSOR_COLORS[1]);
    }

    #[test]
    fn test_record_json_shape() {
        let record = PresenceRecord {
            cursor: Some(Point::new(1.5, 2.0)),
            message: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"cursor":{"x":1.5,"y":2.0},"message":null}"#);
    }
}
