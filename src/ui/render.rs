//! Screens drawn by the controller.
//!
//! Keymap view (128×32):
//!
//! ```text
//! +--------------------------------------+
//! | Keymap name                  1/2     |  header, font row 0
//! |--------------------------------------|  rule at y = FONT_HEIGHT
//! |  cell  |  cell  |  cell  |             3×3 legend grid,
//! |  cell  |  cell  |  cell  |             pressed cells inverted
//! |  cell  |  cell  |  cell  |
//! +--------------------------------------+
//! ```

use core::fmt::Write;

use heapless::String;

use super::{Justify, Screen};
use crate::config::{DISPLAY_HEIGHT, DISPLAY_WIDTH, FONT_HEIGHT, FONT_WIDTH, MATRIX_COLS, MATRIX_ROWS};
use crate::hid::keyboard::{MOD_ALT, MOD_CTRL, MOD_GUI, MOD_SHIFT};
use crate::hid::keycodes;
use crate::input::InputSnapshot;
use crate::keymap::{Keymap, Macro};

/// Longest legend kept before truncating to the cell width.
pub const LABEL_CAPACITY: usize = 32;

pub type Label = String<LABEL_CAPACITY>;

const CELL_WIDTH: u32 = DISPLAY_WIDTH as u32 / MATRIX_COLS as u32;
const GRID_TOP: u32 = FONT_HEIGHT as u32 + 2;
const CELL_HEIGHT: u32 = (DISPLAY_HEIGHT as u32 - GRID_TOP) / MATRIX_ROWS as u32;

/// Legend for a macro, not yet truncated.
pub fn macro_label(m: &Macro, modifier_active: bool) -> Label {
    let mut label = Label::new();
    match m {
        Macro::None => push(&mut label, "None"),
        Macro::HidKey {
            label: Some(custom),
            ..
        } => push(&mut label, custom),
        Macro::HidKey {
            modifier, keycode, ..
        } => {
            for (bits, prefix) in [
                (MOD_SHIFT, "Shf "),
                (MOD_CTRL, "Ctl "),
                (MOD_ALT, "Alt "),
                (MOD_GUI, "Gui "),
            ] {
                if modifier & bits != 0 {
                    push(&mut label, prefix);
                }
            }
            if let Some(key) = keycodes::label_for(*keycode) {
                push(&mut label, key);
            }
            if label.is_empty() {
                push(&mut label, "N/A");
            }
        }
        Macro::Action(action) => push(&mut label, action.label()),
        Macro::Modifier { .. } => push(&mut label, if modifier_active { "Mod*" } else { "Mod" }),
    }
    label
}

/// Append as much of `text` as fits.
fn push(label: &mut Label, text: &str) {
    for c in text.chars() {
        if label.push(c).is_err() {
            break;
        }
    }
}

/// First `chars` characters of `text`.
fn clip(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Draw the active layer of `keymap` and present it.
pub fn draw_keymap<S: Screen>(
    screen: &mut S,
    keymap: &Keymap,
    modifier_active: bool,
    snapshot: &InputSnapshot,
) {
    let width = DISPLAY_WIDTH as u32;
    screen.clear();

    screen.draw_text(keymap.name(), 0, 0, width, Justify::Left, true);
    screen.draw_rect(0, FONT_HEIGHT as i32, width, 1, true);

    let layer = keymap.active_layer();
    let layers = keymap.layers().len();
    if let Some(name) = layer.name.as_deref() {
        screen.draw_text(name, 0, 0, width, Justify::Right, true);
    } else if layers > 1 {
        let mut counter: String<16> = String::new();
        let _ = write!(counter, "{}/{}", keymap.active_layer_index() + 1, layers);
        screen.draw_text(&counter, 0, 0, width, Justify::Right, true);
    }

    let grid = layer.grid(modifier_active);
    let max_chars = (CELL_WIDTH / FONT_WIDTH as u32) as usize;

    for row in 0..MATRIX_ROWS {
        for col in 0..MATRIX_COLS {
            let pressed = snapshot.is_pressed(row, col);
            let x = (col as u32 * CELL_WIDTH) as i32;
            let y = (row as u32 * CELL_HEIGHT + GRID_TOP) as i32;

            screen.draw_rect(x, y, CELL_WIDTH, CELL_HEIGHT, true);
            screen.draw_rect(x + 1, y + 1, CELL_WIDTH - 2, CELL_HEIGHT - 2, pressed);

            let label = macro_label(&grid[InputSnapshot::index(row, col)], modifier_active);
            let text_y = y + (CELL_HEIGHT as i32 - FONT_HEIGHT as i32) / 2;
            screen.draw_text(
                clip(&label, max_chars),
                x,
                text_y,
                CELL_WIDTH,
                Justify::Center,
                !pressed,
            );
        }
    }

    screen.present();
}

/// Screen shown while the configuration drive is attached.
pub fn draw_config_screen<S: Screen>(screen: &mut S) {
    let width = DISPLAY_WIDTH as u32;
    screen.clear();
    screen.draw_text("Config mode", 0, 0, width, Justify::Center, true);
    screen.draw_rect(0, FONT_HEIGHT as i32, width, 1, true);
    screen.draw_text(
        "Eject to save",
        0,
        ((DISPLAY_HEIGHT - FONT_HEIGHT) / 2 + FONT_HEIGHT / 2) as i32,
        width,
        Justify::Center,
        true,
    );
    screen.present();
}

/// Last frame before rebooting into the bootloader.
pub fn draw_flash_notice<S: Screen>(screen: &mut S) {
    screen.clear();
    screen.draw_text(
        "Ready to flash!",
        0,
        ((DISPLAY_HEIGHT - FONT_HEIGHT) / 2) as i32,
        DISPLAY_WIDTH as u32,
        Justify::Center,
        true,
    );
    screen.present();
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::hid::keyboard::{MOD_LEFT_CTRL, MOD_LEFT_SHIFT, MOD_RIGHT_ALT};
    use crate::keymap::{system::system_keymap, Action};
    use crate::testutil::{DrawOp, RecordingScreen};
    use alloc::string::String as HeapString;

    #[test]
    fn labels_for_each_macro_kind() {
        assert_eq!(macro_label(&Macro::None, false), "None");
        assert_eq!(macro_label(&Macro::key(0x04, 0), false), "A");
        assert_eq!(macro_label(&Macro::key(0x29, 0), false), "ESC");
        assert_eq!(macro_label(&Macro::Action(Action::Flash), false), "Flash");
        assert_eq!(macro_label(&Macro::Action(Action::BrightnessUp), false), "Brt +");
        assert_eq!(macro_label(&Macro::Modifier { persistent: true }, false), "Mod");
        assert_eq!(macro_label(&Macro::Modifier { persistent: true }, true), "Mod*");
    }

    #[test]
    fn modifier_prefixes_come_first() {
        assert_eq!(macro_label(&Macro::key(0x1D, MOD_LEFT_CTRL), false), "Ctl Z");
        assert_eq!(
            macro_label(&Macro::key(0x04, MOD_LEFT_SHIFT | MOD_RIGHT_ALT), false),
            "Shf Alt A"
        );
        assert_eq!(macro_label(&Macro::key(0, MOD_LEFT_SHIFT), false), "Shf ");
    }

    #[test]
    fn unresolved_key_shows_na_unless_labelled() {
        assert_eq!(macro_label(&Macro::key(0, 0), false), "N/A");
        let labelled = Macro::HidKey {
            modifier: MOD_LEFT_CTRL,
            keycode: 0,
            label: Some(HeapString::from("Save")),
        };
        assert_eq!(macro_label(&labelled, false), "Save");
    }

    #[test]
    fn clip_counts_characters() {
        assert_eq!(clip("Shf Ctl Alt A", 8), "Shf Ctl ");
        assert_eq!(clip("ESC", 8), "ESC");
    }

    #[test]
    fn keymap_view_draws_header_and_grid() {
        let mut screen = RecordingScreen::default();
        let keymap = system_keymap();
        draw_keymap(&mut screen, &keymap, false, &InputSnapshot::from_masks(1, 0));

        assert_eq!(screen.ops.first(), Some(&DrawOp::Clear));
        assert_eq!(screen.ops.last(), Some(&DrawOp::Present));
        assert!(screen.has_text("System"));
        assert!(screen.has_text("1/2"));
        assert!(screen.has_text("Config"));
        assert!(screen.has_text("Ctl Z"));
        assert!(screen.has_text("Enter"));

        // Every cell is framed; the pressed top-left one is filled and its
        // legend drawn dark.
        assert!(screen.ops.contains(&DrawOp::Rect {
            x: 84,
            y: 24,
            width: 42,
            height: 7,
            on: true
        }));
        assert!(screen.ops.contains(&DrawOp::Rect {
            x: 1,
            y: 11,
            width: 40,
            height: 5,
            on: true
        }));
        assert!(screen.ops.iter().any(|op| matches!(
            op,
            DrawOp::Text { text, on: false, .. } if text == "Config"
        )));
    }

    #[test]
    fn counter_tracks_active_layer() {
        let mut keymap = system_keymap();
        let mut screen = RecordingScreen::default();
        keymap.cycle_layer(true);
        draw_keymap(&mut screen, &keymap, false, &InputSnapshot::default());
        assert!(screen.has_text("2/2"));
        assert!(screen.has_text("7"));
    }

    #[test]
    fn named_layer_replaces_counter() {
        let mut layers = system_keymap().layers().to_vec();
        layers[0].name = Some(HeapString::from("Edit"));
        let keymap = Keymap::new(HeapString::from("Named"), layers).unwrap();
        let mut screen = RecordingScreen::default();
        draw_keymap(&mut screen, &keymap, false, &InputSnapshot::default());
        assert!(screen.has_text("Edit"));
        assert!(!screen.has_text("1/2"));
    }

    #[test]
    fn notices() {
        let mut screen = RecordingScreen::default();
        draw_config_screen(&mut screen);
        assert!(screen.has_text("Config mode"));
        assert!(screen.has_text("Eject to save"));

        let mut screen = RecordingScreen::default();
        draw_flash_notice(&mut screen);
        assert!(screen.has_text("Ready to flash!"));
        assert_eq!(screen.presents(), 1);
    }
}
