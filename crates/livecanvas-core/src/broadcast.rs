//! Fire-and-forget broadcast events and the local flying-reaction list.

use std::collections::VecDeque;

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::presence::ConnectionId;

/// A reaction as sent over the broadcast channel.
///
/// Carries no timestamp: each receiver stamps it with its own clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub x: f64,
    pub y: f64,
    pub value: String,
}

impl ReactionEvent {
    pub fn new(point: Point, value: impl Into<String>) -> Self {
        Self {
            x: point.x,
            y: point.y,
            value: value.into(),
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

type EventHandler = Box<dyn FnMut(ConnectionId, &ReactionEvent)>;

/// Best-effort, at-most-once event channel.
///
/// Emitted events are queued for the transport; nothing is stored or retried.
/// Received events go to every registered handler and to the inbox, in
/// arrival order.
#[derive(Default)]
pub struct BroadcastChannel {
    outgoing: Vec<ReactionEvent>,
    inbox: VecDeque<(ConnectionId, ReactionEvent)>,
    handlers: Vec<EventHandler>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for every peer currently in the room.
    pub fn emit(&mut self, event: ReactionEvent) {
        self.outgoing.push(event);
    }

    /// Drain events waiting to be sent.
    pub fn take_outgoing(&mut self) -> Vec<ReactionEvent> {
        std::mem::take(&mut self.outgoing)
    }

    /// Register a handler called once per received event.
    pub fn on_event(&mut self, handler: impl FnMut(ConnectionId, &ReactionEvent) + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Hand a received event to the handlers and the inbox.
    pub fn deliver(&mut self, from: ConnectionId, event: ReactionEvent) {
        for handler in &mut self.handlers {
            handler(from, &event);
        }
        self.inbox.push_back((from, event));
    }

    /// Drain received events in arrival order.
    pub fn take_received(&mut self) -> Vec<(ConnectionId, ReactionEvent)> {
        self.inbox.drain(..).collect()
    }
}

impl std::fmt::Debug for BroadcastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("outgoing", &self.outgoing.len())
            .field("inbox", &self.inbox.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A reaction currently flying on the local canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub point: Point,
    pub value: String,
    /// Local clock reading (ms) when the reaction was emitted or received.
    pub timestamp: u64,
}

/// Reactions shown locally until they expire.
#[derive(Debug, Clone)]
pub struct ActiveReactions {
    reactions: Vec<Reaction>,
    ttl_ms: u64,
}

impl ActiveReactions {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            reactions: Vec::new(),
            ttl_ms,
        }
    }

    pub fn push(&mut self, point: Point, value: impl Into<String>, now_ms: u64) {
        self.reactions.push(Reaction {
            point,
            value: value.into(),
            timestamp: now_ms,
        });
    }

    fn is_live(&self, reaction: &Reaction, now_ms: u64) -> bool {
        now_ms < reaction.timestamp.saturating_add(self.ttl_ms)
    }

    /// Drop expired reactions. Returns how many were removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.reactions.len();
        let ttl = self.ttl_ms;
        self.reactions
            .retain(|r| now_ms < r.timestamp.saturating_add(ttl));
        before - self.reactions.len()
    }

    /// Reactions still live at `now_ms`, whether or not a sweep has run.
    pub fn active(&self, now_ms: u64) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter().filter(move |r| self.is_live(r, now_ms))
    }

    /// Number of stored reactions (live or awaiting the next sweep).
    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}

/// Fixed-period timer driven by explicit clock readings.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    period_ms: u64,
    last_fired: Option<u64>,
}

impl Interval {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            last_fired: None,
        }
    }

    /// Whether the timer fires at `now_ms`. Firing restarts the period.
    pub fn due(&mut self, now_ms: u64) -> bool {
        match self.last_fired {
            Some(last) if now_ms < last.saturating_add(self.period_ms) => false,
            _ => {
                self.last_fired = Some(now_ms);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_reaction_expiry_window() {
        let mut reactions = ActiveReactions::new(4000);
        reactions.push(Point::new(10.0, 20.0), "🎉", 1_000);

        assert_eq!(reactions.active(4_999).count(), 1);
        assert_eq!(reactions.sweep(4_999), 0);
        assert_eq!(reactions.active(5_001).count(), 0);
        assert_eq!(reactions.sweep(5_001), 1);
        assert!(reactions.is_empty());
    }

    #[test]
    fn test_handlers_run_in_arrival_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut channel = BroadcastChannel::new();
        let sink = seen.clone();
        channel.on_event(move |from, event| sink.borrow_mut().push((from, event.value.clone())));

        channel.deliver(2, ReactionEvent::new(Point::new(0.0, 0.0), "👍"));
        channel.deliver(1, ReactionEvent::new(Point::new(0.0, 0.0), "🔥"));

        assert_eq!(
            *seen.borrow(),
            vec![(2, "👍".to_string()), (1, "🔥".to_string())]
        );
        let received = channel.take_received();
        assert_eq!(received.len(), 2);
        assert!(channel.take_received().is_empty());
    }

    #[test]
    fn test_emit_is_drained_once() {
        let mut channel = BroadcastChannel::new();
        channel.emit(ReactionEvent::new(Point::new(1.0, 2.0), "😍"));
        assert_eq!(channel.take_outgoing().len(), 1);
        assert!(channel.take_outgoing().is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let event = ReactionEvent::new(Point::new(10.0, 20.0), "🎉");
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"x":10.0,"y":20.0,"value":"🎉"}"#);
    }

    #[test]
    fn test_interval() {
        let mut interval = Interval::new(100);
        assert!(interval.due(0));
        assert!(!interval.due(99));
        assert!(interval.due(100));
        assert!(!interval.due(150));
        assert!(interval.due(260));
    }
}
