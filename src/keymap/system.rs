//! Built-in keymap appended after the user keymaps.

use alloc::string::String;
use alloc::vec;

use super::{empty_grid, Action, Keymap, Layer, Macro};
use crate::hid::keyboard::MOD_LEFT_CTRL;
use crate::hid::keycodes::{digit, KEY_C, KEY_ENTER, KEY_ESCAPE, KEY_V, KEY_Z};

/// Name shown in the header for the built-in keymap.
pub const SYSTEM_KEYMAP_NAME: &str = "System";

/// Device controls and clipboard shortcuts, then a numeric pad.
pub fn system_keymap() -> Keymap {
    let controls = Layer {
        name: None,
        base: [
            Macro::Action(Action::EnterConfig),
            Macro::Action(Action::BrightnessUp),
            Macro::Action(Action::BrightnessDown),
            Macro::key(KEY_Z, MOD_LEFT_CTRL),
            Macro::key(KEY_C, MOD_LEFT_CTRL),
            Macro::key(KEY_V, MOD_LEFT_CTRL),
            Macro::key(KEY_ESCAPE, 0),
            Macro::key(KEY_ENTER, 0),
            Macro::Action(Action::Flash),
        ],
        overlay: empty_grid(),
    };

    let numpad = Layer::new([7, 8, 9, 4, 5, 6, 1, 2, 3].map(|n| Macro::key(digit(n), 0)));

    Keymap {
        name: String::from(SYSTEM_KEYMAP_NAME),
        layers: vec![controls, numpad],
        active_layer: 0,
    }
}
