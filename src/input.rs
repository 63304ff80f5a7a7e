//! # Input Module
//!
//! Tracks which physical keys are held down so the window can react to key chords. Only the
//! close chord exists for now.

use std::collections::HashSet;

use winit::event::ElementState;
use winit::keyboard::KeyCode;

#[derive(Debug, Default)]
pub struct Input {
    pressed: HashSet<KeyCode>,
    /// Every key here held at the same time asks the window to close.
    close_keys: Vec<KeyCode>,
}

impl Input {
    pub fn new(close_keys: Vec<KeyCode>) -> Self {
        Self {
            pressed: HashSet::new(),
            close_keys,
        }
    }

    /// Records a key press or release reported by the event loop.
    pub fn key_changed(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.pressed.insert(key);
            }
            ElementState::Released => {
                self.pressed.remove(&key);
            }
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// True while the whole close chord is held. An empty chord never fires.
    pub fn close_requested(&self) -> bool {
        !self.close_keys.is_empty() && self.close_keys.iter().all(|&key| self.is_pressed(key))
    }

    /// Forgets held keys, e.g. when focus moves away and releases would go unseen.
    pub fn clear(&mut self) {
        self.pressed.clear();
    }
}
