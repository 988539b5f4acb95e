//! Boot keyboard report and its descriptor.
//!
//! ```text
//! [0]    modifier bits: LCtl LShf LAlt LGui RCtl RShf RAlt RGui (bit 0..7)
//! [1]    reserved, always 0
//! [2..8] up to six usage codes, unused slots 0
//! ```

pub const KEYBOARD_REPORT_SIZE: usize = 8;

/// Usage code slots in one report.
pub const MAX_KEYCODES: usize = 6;

pub const MOD_LEFT_CTRL: u8 = 0x01;
pub const MOD_LEFT_SHIFT: u8 = 0x02;
pub const MOD_LEFT_ALT: u8 = 0x04;
pub const MOD_LEFT_GUI: u8 = 0x08;
pub const MOD_RIGHT_CTRL: u8 = 0x10;
pub const MOD_RIGHT_SHIFT: u8 = 0x20;
pub const MOD_RIGHT_ALT: u8 = 0x40;
pub const MOD_RIGHT_GUI: u8 = 0x80;

/// Side-agnostic masks, used for legends.
pub const MOD_CTRL: u8 = MOD_LEFT_CTRL | MOD_RIGHT_CTRL;
pub const MOD_SHIFT: u8 = MOD_LEFT_SHIFT | MOD_RIGHT_SHIFT;
pub const MOD_ALT: u8 = MOD_LEFT_ALT | MOD_RIGHT_ALT;
pub const MOD_GUI: u8 = MOD_LEFT_GUI | MOD_RIGHT_GUI;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    pub modifier: u8,
    pub reserved: u8,
    pub keycodes: [u8; MAX_KEYCODES],
}

impl KeyboardReport {
    /// The all-keys-released report.
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            reserved: 0,
            keycodes: [0; MAX_KEYCODES],
        }
    }

    /// Put `keycode` in the first free slot. Returns `false` when all six
    /// slots are taken.
    pub fn push_key(&mut self, keycode: u8) -> bool {
        match self.keycodes.iter_mut().find(|slot| **slot == 0) {
            Some(slot) => {
                *slot = keycode;
                true
            }
            None => false,
        }
    }

    /// Write the wire form into `buf`. Returns the length written, or 0 when
    /// `buf` is shorter than a report.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let Some(out) = buf.get_mut(..KEYBOARD_REPORT_SIZE) else {
            return 0;
        };
        out[0] = self.modifier;
        out[1] = self.reserved;
        out[2..].copy_from_slice(&self.keycodes);
        KEYBOARD_REPORT_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes == [0; MAX_KEYCODES]
    }
}

/// Boot-compatible keyboard: 8 modifier bits, a padding byte, 5 LED outputs
/// and six array-style key slots.
pub const KEYBOARD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, // Generic Desktop / Keyboard, Application
    // modifiers
    0x05, 0x07, 0x19, 0xE0, 0x29, 0xE7, 0x15, 0x00, 0x25, 0x01, //
    0x75, 0x01, 0x95, 0x08, 0x81, 0x02, //
    // reserved byte
    0x75, 0x08, 0x95, 0x01, 0x81, 0x01, //
    // LEDs, padded to a byte
    0x05, 0x08, 0x19, 0x01, 0x29, 0x05, 0x75, 0x01, 0x95, 0x05, 0x91, 0x02, //
    0x75, 0x03, 0x95, 0x01, 0x91, 0x01, //
    // key slots
    0x05, 0x07, 0x19, 0x00, 0x29, 0xFF, 0x15, 0x00, 0x26, 0xFF, 0x00, //
    0x75, 0x08, 0x95, 0x06, 0x81, 0x00, //
    0xC0,
];
