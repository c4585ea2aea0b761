use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Raw input code: DOM-style key codes are positive, pointer buttons and
/// wheel directions use the negative sentinels in [`button`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputCode(pub i32);

pub mod key {
    use super::InputCode;

    pub const TAB: InputCode = InputCode(9);
    pub const ENTER: InputCode = InputCode(13);
    pub const ESC: InputCode = InputCode(27);
    pub const SPACE: InputCode = InputCode(32);
    pub const LEFT_ARROW: InputCode = InputCode(37);
    pub const UP_ARROW: InputCode = InputCode(38);
    pub const RIGHT_ARROW: InputCode = InputCode(39);
    pub const DOWN_ARROW: InputCode = InputCode(40);
}

pub mod button {
    use super::InputCode;

    pub const LEFT: InputCode = InputCode(-1);
    pub const MIDDLE: InputCode = InputCode(-2);
    pub const RIGHT: InputCode = InputCode(-3);
    pub const WHEEL_DOWN: InputCode = InputCode(-4);
    pub const WHEEL_UP: InputCode = InputCode(-5);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInputEvent {
    KeyDown { code: i32 },
    KeyUp { code: i32 },
    PointerDown { button: u8, x: f32, y: f32 },
    PointerUp { button: u8, x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    Wheel { delta: f32 },
    ContextMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Down,
    Up,
}

/// Whether the host should suppress the platform's default handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Consumed,
    Ignored,
}

/// Last pointer-move position. Button events leave it untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Default)]
pub struct InputTracker {
    bindings: HashMap<InputCode, String>,
    down: HashSet<String>,
    pressed: HashSet<String>,
    released: Vec<String>,
    pointer: PointerPosition,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, code: InputCode, action: impl Into<String>) {
        let action = action.into();
        if let Some(previous) = self.bindings.insert(code, action.clone()) {
            if previous != action {
                debug!(code = code.0, previous = %previous, action = %action, "input_rebound");
            }
        }
    }

    pub fn binding(&self, code: InputCode) -> Option<&str> {
        self.bindings.get(&code).map(String::as_str)
    }

    pub fn handle_event(&mut self, event: RawInputEvent) -> EventDisposition {
        match event {
            RawInputEvent::KeyDown { code } => self.apply(InputCode(code), Phase::Down),
            RawInputEvent::KeyUp { code } => self.apply(InputCode(code), Phase::Up),
            RawInputEvent::PointerDown { button, .. } => {
                match pointer_button_code(button) {
                    Some(code) => self.apply(code, Phase::Down),
                    None => EventDisposition::Ignored,
                }
            }
            RawInputEvent::PointerUp { button, .. } => {
                match pointer_button_code(button) {
                    Some(code) => self.apply(code, Phase::Up),
                    None => EventDisposition::Ignored,
                }
            }
            RawInputEvent::PointerMove { x, y } => {
                self.set_pointer(x, y);
                EventDisposition::Ignored
            }
            RawInputEvent::Wheel { delta } => {
                // A wheel notch has no sustained state.
                let code = wheel_code(delta);
                let down = self.apply(code, Phase::Down);
                let up = self.apply(code, Phase::Up);
                if down == EventDisposition::Consumed || up == EventDisposition::Consumed {
                    EventDisposition::Consumed
                } else {
                    EventDisposition::Ignored
                }
            }
            RawInputEvent::ContextMenu => {
                if self.bindings.contains_key(&button::RIGHT) {
                    EventDisposition::Consumed
                } else {
                    EventDisposition::Ignored
                }
            }
        }
    }

    pub fn apply(&mut self, code: InputCode, phase: Phase) -> EventDisposition {
        let Some(action) = self.bindings.get(&code) else {
            trace!(code = code.0, ?phase, "input_unbound");
            return EventDisposition::Ignored;
        };
        let action = action.clone();
        debug!(action = %action, ?phase, "input_action");

        match phase {
            Phase::Down => {
                if !self.down.contains(&action) {
                    self.pressed.insert(action.clone());
                }
                self.down.insert(action);
            }
            Phase::Up => {
                if self.down.remove(&action) {
                    self.pressed.remove(&action);
                }
                self.released.push(action);
            }
        }
        EventDisposition::Consumed
    }

    /// Ends the tick: drops every press edge and release marker.
    pub fn clear_pressed(&mut self) {
        for action in self.released.drain(..) {
            self.down.remove(&action);
        }
        self.pressed.clear();
    }

    pub fn pressed(&self, action: &str) -> bool {
        self.pressed.contains(action)
    }

    pub fn down(&self, action: &str) -> bool {
        self.down.contains(action)
    }

    pub fn released(&self, action: &str) -> bool {
        self.released.iter().any(|released| released == action)
    }

    pub fn pointer(&self) -> PointerPosition {
        self.pointer
    }

    fn set_pointer(&mut self, x: f32, y: f32) {
        self.pointer = PointerPosition { x, y };
    }
}

fn pointer_button_code(button: u8) -> Option<InputCode> {
    match button {
        0 => Some(button::LEFT),
        1 => Some(button::MIDDLE),
        2 => Some(button::RIGHT),
        _ => None,
    }
}

fn wheel_code(delta: f32) -> InputCode {
    if delta > 0.0 {
        button::WHEEL_UP
    } else {
        button::WHEEL_DOWN
    }
}
