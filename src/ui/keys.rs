//! Key mapping for the lock prompt
//!
//! Converts crossterm key events to prompt keys. Control combinations that a
//! raw terminal delivers instead of named keys (Ctrl+H, Ctrl+M, Ctrl+J) map
//! to their named equivalents; every other modified key is ignored so it
//! never ends up in the secret.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::lock::Key;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Whether the event is a key going down (or repeating).
pub fn is_press(event: &KeyEvent) -> bool {
    event.kind != KeyEventKind::Release
}

/// Map a crossterm key event for the prompt. `None` for key releases.
pub fn map_key(event: &KeyEvent) -> Option<Key> {
    if !is_press(event) {
        return None;
    }
    let mods = Modifiers::from(event.modifiers);

    let key = match event.code {
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace | KeyCode::Delete => Key::Backspace,
        KeyCode::Char(ch) if mods.contains(Modifiers::CTRL) => match ch.to_ascii_lowercase() {
            'h' => Key::Backspace,
            'm' | 'j' => Key::Enter,
            'u' => Key::ClearLine,
            _ => Key::Other,
        },
        KeyCode::Char(_) if mods.contains(Modifiers::ALT) => Key::Other,
        KeyCode::Char(ch) => Key::Char(ch),
        _ => Key::Other,
    };
    Some(key)
}
