//! Viewer input vocabulary.

use serde::{Deserialize, Serialize};

/// The twelve standard joypad buttons, valued by their libretro device ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum JoypadButton {
    B = 0,
    Y = 1,
    Select = 2,
    Start = 3,
    Up = 4,
    Down = 5,
    Left = 6,
    Right = 7,
    A = 8,
    X = 9,
    L = 10,
    R = 11,
}

impl JoypadButton {
    /// All buttons, ordered by code.
    pub const ALL: [JoypadButton; 12] = [
        Self::B,
        Self::Y,
        Self::Select,
        Self::Start,
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::A,
        Self::X,
        Self::L,
        Self::R,
    ];

    /// Core button code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::B => "B",
            Self::Y => "Y",
            Self::Select => "SELECT",
            Self::Start => "START",
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::A => "A",
            Self::X => "X",
            Self::L => "L",
            Self::R => "R",
        }
    }

    /// Look a button up by name, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|button| button.name().eq_ignore_ascii_case(name))
    }

    /// Look a button up by core code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Pressed state as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    Down,
    Up,
}

/// A viewer input event, before button-name normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Button name as sent by the viewer.
    pub button: String,

    /// Whether the button is held.
    pub pressed: bool,
}

impl InputEvent {
    /// Create a new input event.
    pub fn new(button: impl Into<String>, pressed: bool) -> Self {
        Self {
            button: button.into(),
            pressed,
        }
    }
}

/// Input body accepted from HTTP and WebSocket clients.
///
/// Accepts either `{"button": "A", "state": "down"}` or
/// `{"button": "A", "pressed": true}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InputPayload {
    pub button: String,
    #[serde(default)]
    pub state: Option<ButtonState>,
    #[serde(default)]
    pub pressed: Option<bool>,
}

impl InputPayload {
    /// Resolve the payload into an event; `None` if no pressed state is given.
    pub fn into_event(self) -> Option<InputEvent> {
        let pressed = match (self.state, self.pressed) {
            (Some(state), _) => state == ButtonState::Down,
            (None, Some(pressed)) => pressed,
            (None, None) => return None,
        };
        Some(InputEvent {
            button: self.button,
            pressed,
        })
    }
}

/// Application messages a viewer may send over a data or pub/sub channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ViewerMessage {
    /// A button event.
    Input(InputPayload),

    /// Anything else (pings, telemetry); ignored by the engine.
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_lookup_is_case_insensitive() {
        assert_eq!(JoypadButton::from_name("start"), Some(JoypadButton::Start));
        assert_eq!(JoypadButton::from_name("Select"), Some(JoypadButton::Select));
        assert_eq!(JoypadButton::from_name(" a "), Some(JoypadButton::A));
        assert_eq!(JoypadButton::from_name("turbo"), None);
    }

    #[test]
    fn test_button_codes_match_libretro() {
        assert_eq!(JoypadButton::B.code(), 0);
        assert_eq!(JoypadButton::A.code(), 8);
        assert_eq!(JoypadButton::R.code(), 11);
        for button in JoypadButton::ALL {
            assert_eq!(JoypadButton::from_code(button.code()), Some(button));
        }
        assert_eq!(JoypadButton::from_code(12), None);
    }

    #[test]
    fn test_viewer_message_input() {
        let msg: ViewerMessage =
            serde_json::from_str(r#"{"type":"input","button":"UP","state":"down"}"#).unwrap();
        let ViewerMessage::Input(payload) = msg else {
            panic!("expected input");
        };
        assert_eq!(payload.into_event(), Some(InputEvent::new("UP", true)));
    }

    #[test]
    fn test_viewer_message_pressed_flag() {
        let msg: ViewerMessage =
            serde_json::from_str(r#"{"type":"input","button":"b","pressed":false}"#).unwrap();
        let ViewerMessage::Input(payload) = msg else {
            panic!("expected input");
        };
        assert_eq!(payload.into_event(), Some(InputEvent::new("b", false)));
    }

    #[test]
    fn test_viewer_message_other() {
        let msg: ViewerMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ViewerMessage::Other));
    }

    #[test]
    fn test_payload_without_state_is_incomplete() {
        let payload: InputPayload = serde_json::from_str(r#"{"button":"A"}"#).unwrap();
        assert_eq!(payload.into_event(), None);
    }
}
