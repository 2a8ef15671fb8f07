//! Player input: discrete direction keys plus an analog joystick.
//!
//! Listeners write into [`InputCells`]; the frame loop reads a
//! [`InputState`] snapshot once per frame. Writing input never touches the
//! loop itself.

use serde::{Deserialize, Serialize};

/// Directional key, as mapped from a browser key code.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Forward,
    Backward,
    Left,
    Right,
}

impl Key {
    /// Map a `KeyboardEvent.code` to a direction (arrows and WASD).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ArrowUp" | "KeyW" => Some(Key::Forward),
            "ArrowDown" | "KeyS" => Some(Key::Backward),
            "ArrowLeft" | "KeyA" => Some(Key::Left),
            "ArrowRight" | "KeyD" => Some(Key::Right),
            _ => None,
        }
    }
}

/// Input as seen by one frame. No history is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    /// Analog stick, each axis in [-1, 1]. `+y` is stick-up (forward).
    pub joystick: (f32, f32),
}

impl InputState {
    pub fn set_key(&mut self, key: Key, pressed: bool) {
        match key {
            Key::Forward => self.forward = pressed,
            Key::Backward => self.backward = pressed,
            Key::Left => self.left = pressed,
            Key::Right => self.right = pressed,
        }
    }

    pub fn set_joystick(&mut self, x: f32, y: f32) {
        let clean = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        self.joystick = (clean(x), clean(y));
    }

    /// Raw ground-plane displacement `(dx, dz)` for one frame.
    ///
    /// Forward is −Z, so the joystick's Y axis is inverted.
    pub fn displacement(&self, move_speed: f32) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dz = 0.0;

        if self.forward {
            dz -= move_speed;
        }
        if self.backward {
            dz += move_speed;
        }
        if self.left {
            dx -= move_speed;
        }
        if self.right {
            dx += move_speed;
        }

        let (jx, jy) = self.joystick;
        dx += jx * move_speed;
        dz -= jy * move_speed;

        (dx, dz)
    }
}

// ---------------------------------------------------------------------------
// Shared cells (runtime only)
// ---------------------------------------------------------------------------

#[cfg(feature = "runtime")]
pub use cells::InputCells;

#[cfg(feature = "runtime")]
mod cells {
    use super::{InputState, Key};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Cloneable handle written by key/joystick listeners and read by the
    /// frame loop.
    #[derive(Debug, Clone, Default)]
    pub struct InputCells {
        state: Arc<Mutex<InputState>>,
    }

    impl InputCells {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn key_down(&self, key: Key) {
            self.state.lock().set_key(key, true);
        }

        pub fn key_up(&self, key: Key) {
            self.state.lock().set_key(key, false);
        }

        /// Route a raw key code; unknown codes are ignored.
        pub fn key_code(&self, code: &str, pressed: bool) {
            if let Some(key) = Key::from_code(code) {
                self.state.lock().set_key(key, pressed);
            }
        }

        pub fn joystick(&self, x: f32, y: f32) {
            self.state.lock().set_joystick(x, y);
        }

        /// Release everything (focus lost, joystick let go, …).
        pub fn release_all(&self) {
            *self.state.lock() = InputState::default();
        }

        pub fn snapshot(&self) -> InputState {
            *self.state.lock()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
