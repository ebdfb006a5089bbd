//! Local cursor mode: what a pointer press currently means.
//!
//! Exactly one [`CursorState`] is active at a time. Transitions that affect
//! what peers see return a [`PresenceUpdate`] for the caller to publish.

use kurbo::Point;

use crate::presence::PresenceUpdate;

/// Key that opens cursor chat.
pub const CHAT_KEY: &str = "/";
/// Key that opens the reaction selector.
pub const REACTION_KEY: &str = "e";
/// Key that hides the cursor overlay.
pub const ESCAPE_KEY: &str = "Escape";

/// Discriminant of [`CursorState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Hidden,
    Chat,
    ReactionSelector,
    Reaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorState {
    Hidden,
    Chat {
        previous_message: Option<String>,
        message: String,
    },
    ReactionSelector,
    Reaction {
        value: String,
        is_pressed: bool,
    },
}

impl CursorState {
    pub fn mode(&self) -> CursorMode {
        match self {
            CursorState::Hidden => CursorMode::Hidden,
            CursorState::Chat { .. } => CursorMode::Chat,
            CursorState::ReactionSelector => CursorMode::ReactionSelector,
            CursorState::Reaction { .. } => CursorMode::Reaction,
        }
    }
}

/// The cursor state machine.
#[derive(Debug, Clone)]
pub struct CursorMachine {
    state: CursorState,
}

impl Default for CursorMachine {
    fn default() -> Self {
        Self {
            state: CursorState::Hidden,
        }
    }
}

impl CursorMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn mode(&self) -> CursorMode {
        self.state.mode()
    }

    /// Handle a released key.
    ///
    /// Chat text is not routed here; see [`CursorMachine::chat_input`].
    pub fn key(&mut self, key: &str) -> Option<PresenceUpdate> {
        match key {
            CHAT_KEY => {
                self.state = CursorState::Chat {
                    previous_message: None,
                    message: String::new(),
                };
                None
            }
            ESCAPE_KEY => {
                self.state = CursorState::Hidden;
                Some(PresenceUpdate::message(None))
            }
            REACTION_KEY => {
                self.state = CursorState::ReactionSelector;
                None
            }
            _ => None,
        }
    }

    /// A reaction was picked in the selector.
    pub fn pick_reaction(&mut self, value: impl Into<String>) -> bool {
        if self.mode() != CursorMode::ReactionSelector {
            log::debug!("Ignoring reaction pick outside the selector");
            return false;
        }
        self.state = CursorState::Reaction {
            value: value.into(),
            is_pressed: false,
        };
        true
    }

    /// Pointer moved to `point` while `current_cursor` is shown to peers.
    ///
    /// With the selector open, an already visible cursor stays pinned so the
    /// selector does not follow the pointer.
    pub fn pointer_move(&self, current_cursor: Option<Point>, point: Point) -> Option<PresenceUpdate> {
        if current_cursor.is_some() && self.mode() == CursorMode::ReactionSelector {
            None
        } else {
            Some(PresenceUpdate::cursor(Some(point)))
        }
    }

    pub fn pointer_down(&mut self) {
        self.set_pressed(true);
    }

    pub fn pointer_up(&mut self) {
        self.set_pressed(false);
    }

    fn set_pressed(&mut self, pressed: bool) {
        if let CursorState::Reaction { is_pressed, .. } = &mut self.state {
            *is_pressed = pressed;
        }
    }

    /// Pointer left the canvas: hide and clear cursor and message.
    pub fn pointer_leave(&mut self) -> PresenceUpdate {
        self.state = CursorState::Hidden;
        PresenceUpdate::cursor(None).with_message(None)
    }

    /// Chat text changed. Only meaningful in chat mode.
    pub fn chat_input(&mut self, text: &str) -> Option<PresenceUpdate> {
        match &mut self.state {
            CursorState::Chat { message, .. } => {
                *message = text.to_string();
                Some(PresenceUpdate::message(Some(text.to_string())))
            }
            _ => None,
        }
    }

    /// Enter in chat: keep the sent text as the previous message and start over.
    pub fn chat_submit(&mut self) -> bool {
        match &mut self.state {
            CursorState::Chat {
                previous_message,
                message,
            } => {
                *previous_message = Some(std::mem::take(message));
                true
            }
            _ => false,
        }
    }

    /// Reaction to emit on the next periodic tick, if the pointer is held.
    pub fn pressed_reaction(&self) -> Option<&str> {
        match &self.state {
            CursorState::Reaction {
                value,
                is_pressed: true,
            } => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_states() -> Vec<CursorMachine> {
        let hidden = CursorMachine::new();
        let mut chat = CursorMachine::new();
        chat.key(CHAT_KEY);
        let mut selector = CursorMachine::new();
        selector.key(REACTION_KEY);
        let mut reaction = selector.clone();
        reaction.pick_reaction("👍");
        reaction.pointer_down();
        vec![hidden, chat, selector, reaction]
    }

    #[test]
    fn test_escape_from_any_state() {
        for mut machine in all_states() {
            let update = machine.key(ESCAPE_KEY).unwrap();
            assert_eq!(machine.mode(), CursorMode::Hidden);
            assert_eq!(update.message, Some(None));
        }
    }

    #[test]
    fn test_reaction_key_from_any_state() {
        for mut machine in all_states() {
            machine.key(REACTION_KEY);
            assert_eq!(machine.mode(), CursorMode::ReactionSelector);
        }
    }

    #[test]
    fn test_chat_seeds_empty_message() {
        let mut machine = CursorMachine::new();
        assert!(machine.key(CHAT_KEY).is_none());
        assert_eq!(
            machine.state(),
            &CursorState::Chat {
                previous_message: None,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_pick_requires_selector() {
        let mut machine = CursorMachine::new();
        assert!(!machine.pick_reaction("🔥"));
        assert_eq!(machine.mode(), CursorMode::Hidden);

        machine.key(REACTION_KEY);
        assert!(machine.pick_reaction("🔥"));
        assert_eq!(
            machine.state(),
            &CursorState::Reaction {
                value: "🔥".to_string(),
                is_pressed: false
            }
        );
    }

    #[test]
    fn test_press_and_release() {
        let mut machine = CursorMachine::new();
        machine.key(REACTION_KEY);
        machine.pick_reaction("🎉");
        assert_eq!(machine.pressed_reaction(), None);

        machine.pointer_down();
        assert_eq!(machine.pressed_reaction(), Some("🎉"));

        machine.pointer_up();
        assert_eq!(machine.pressed_reaction(), None);
    }

    #[test]
    fn test_pointer_leave_hides_and_clears() {
        for mut machine in all_states() {
            let update = machine.pointer_leave();
            assert_eq!(machine.mode(), CursorMode::Hidden);
            assert_eq!(update.cursor, Some(None));
            assert_eq!(update.message, Some(None));
        }
    }

    #[test]
    fn test_pointer_move_pinned_by_selector() {
        let mut machine = CursorMachine::new();
        let p = Point::new(4.0, 4.0);
        assert!(machine.pointer_move(None, p).is_some());

        machine.key(REACTION_KEY);
        assert!(machine.pointer_move(Some(Point::ZERO), p).is_none());
        assert!(machine.pointer_move(None, p).is_some());
    }

    #[test]
    fn test_chat_input_and_submit() {
        let mut machine = CursorMachine::new();
        assert!(machine.chat_input("ignored").is_none());

        machine.key(CHAT_KEY);
        let update = machine.chat_input("hello").unwrap();
        assert_eq!(update.message, Some(Some("hello".to_string())));

        assert!(machine.chat_submit());
        assert_eq!(
            machine.state(),
            &CursorState::Chat {
                previous_message: Some("hello".to_string()),
                message: String::new()
            }
        );
    }
}
