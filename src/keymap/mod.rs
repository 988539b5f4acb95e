//! Keymap data model: macros, layers, keymaps and the owning collection.
//!
//! A [`KeymapCollection`] is built in one go by the loader and swapped in
//! whole on reload; nothing edits it cell by cell.

pub mod loader;
pub mod system;


use alloc::string::String;
use alloc::vec::Vec;

use crate::config::KEY_COUNT;
use crate::error::ConfigError;

/// Firmware actions a key can trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Switch to the configuration drive personality.
    EnterConfig,
    /// Reboot into the USB bootloader.
    Flash,
    BrightnessUp,
    BrightnessDown,
}

impl Action {
    /// Parse the `v` field of an `action` cell.
    pub fn from_name(name: &str) -> Option<Self> {
        let action = match name {
            "config" | "configure" => Action::EnterConfig,
            "flash" => Action::Flash,
            "brightness_up" | "brt_up" => Action::BrightnessUp,
            "brightness_down" | "brt_down" => Action::BrightnessDown,
            _ => return None,
        };
        Some(action)
    }

    /// Legend drawn on the key grid.
    pub fn label(self) -> &'static str {
        match self {
            Action::EnterConfig => "Config",
            Action::Flash => "Flash",
            Action::BrightnessUp => "Brt +",
            Action::BrightnessDown => "Brt -",
        }
    }
}

/// What one matrix cell does on one layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Macro {
    #[default]
    None,
    /// Emit a key (or only modifier bits when `keycode` is 0).
    HidKey {
        modifier: u8,
        keycode: u8,
        label: Option<String>,
    },
    Action(Action),
    /// Switch the layer between its base and overlay grid, either while
    /// held or as a toggle.
    Modifier { persistent: bool },
}

impl Macro {
    /// Plain key without a custom label.
    pub const fn key(keycode: u8, modifier: u8) -> Self {
        Macro::HidKey {
            modifier,
            keycode,
            label: None,
        }
    }
}

/// One grid of macros, indexed `row * MATRIX_COLS + col`.
pub type Grid = [Macro; KEY_COUNT];

/// A grid where every cell does nothing.
pub fn empty_grid() -> Grid {
    core::array::from_fn(|_| Macro::None)
}

/// One page of a keymap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    pub name: Option<String>,
    pub base: Grid,
    /// Used instead of `base` while the modifier state is active.
    pub overlay: Grid,
}

impl Layer {
    pub fn new(base: Grid) -> Self {
        Self {
            name: None,
            base,
            overlay: empty_grid(),
        }
    }

    /// The grid in effect for the given modifier state.
    pub fn grid(&self, modifier_active: bool) -> &Grid {
        if modifier_active {
            &self.overlay
        } else {
            &self.base
        }
    }
}

/// A named set of layers with a current page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keymap {
    name: String,
    layers: Vec<Layer>,
    active_layer: usize,
}

impl Keymap {
    /// A keymap needs at least one layer.
    pub fn new(name: String, layers: Vec<Layer>) -> Result<Self, ConfigError> {
        if layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }
        Ok(Self {
            name,
            layers,
            active_layer: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn active_layer_index(&self) -> usize {
        self.active_layer
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer]
    }

    /// Step to the next or previous layer, wrapping at both ends.
    pub fn cycle_layer(&mut self, forward: bool) {
        self.active_layer = step(self.active_layer, self.layers.len(), forward);
    }
}

/// Every loaded keymap plus the selection. Never empty: the system keymap
/// is always the last entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeymapCollection {
    keymaps: Vec<Keymap>,
    selected: usize,
}

impl KeymapCollection {
    /// Wrap user keymaps and append the system keymap.
    pub fn new(mut keymaps: Vec<Keymap>) -> Self {
        keymaps.push(system::system_keymap());
        Self {
            keymaps,
            selected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.keymaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keymaps.is_empty()
    }

    pub fn keymaps(&self) -> &[Keymap] {
        &self.keymaps
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn active(&self) -> &Keymap {
        &self.keymaps[self.selected]
    }

    pub fn active_mut(&mut self) -> &mut Keymap {
        &mut self.keymaps[self.selected]
    }

    /// Step to the next or previous keymap, wrapping at both ends.
    pub fn cycle(&mut self, forward: bool) {
        self.selected = step(self.selected, self.keymaps.len(), forward);
    }
}

fn step(current: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (current + 1) % len
    } else if current == 0 {
        len - 1
    } else {
        current - 1
    }
}
