//! Static symbol table mapping configuration key names to HID usage codes
//! and the short legend drawn on the display.
//!
//! Names are matched case-insensitively. Several names may share a code; the
//! first entry for a code provides its legend.

/// One row of the key table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySymbol {
    /// Name accepted in `config.json`.
    pub name: &'static str,
    /// HID keyboard usage code.
    pub code: u8,
    /// Legend shown on the key grid.
    pub label: &'static str,
}

/// HID usage code meaning "no key".
pub const KEY_NONE: u8 = 0x00;

pub const KEY_C: u8 = 0x06;
pub const KEY_V: u8 = 0x19;
pub const KEY_Z: u8 = 0x1D;
pub const KEY_1: u8 = 0x1E;
pub const KEY_ENTER: u8 = 0x28;
pub const KEY_ESCAPE: u8 = 0x29;

#[rustfmt::skip]
pub static KEY_TABLE: &[KeySymbol] = &[
    KeySymbol { name: "a", code: 0x04, label: "A" },
    KeySymbol { name: "b", code: 0x05, label: "B" },
    KeySymbol { name: "c", code: 0x06, label: "C" },
    KeySymbol { name: "d", code: 0x07, label: "D" },
    KeySymbol { name: "e", code: 0x08, label: "E" },
    KeySymbol { name: "f", code: 0x09, label: "F" },
    KeySymbol { name: "g", code: 0x0A, label: "G" },
    KeySymbol { name: "h", code: 0x0B, label: "H" },
    KeySymbol { name: "i", code: 0x0C, label: "I" },
    KeySymbol { name: "j", code: 0x0D, label: "J" },
    KeySymbol { name: "k", code: 0x0E, label: "K" },
    KeySymbol { name: "l", code: 0x0F, label: "L" },
    KeySymbol { name: "m", code: 0x10, label: "M" },
    KeySymbol { name: "n", code: 0x11, label: "N" },
    KeySymbol { name: "o", code: 0x12, label: "O" },
    KeySymbol { name: "p", code: 0x13, label: "P" },
    KeySymbol { name: "q", code: 0x14, label: "Q" },
    KeySymbol { name: "r", code: 0x15, label: "R" },
    KeySymbol { name: "s", code: 0x16, label: "S" },
    KeySymbol { name: "t", code: 0x17, label: "T" },
    KeySymbol { name: "u", code: 0x18, label: "U" },
    KeySymbol { name: "v", code: 0x19, label: "V" },
    KeySymbol { name: "w", code: 0x1A, label: "W" },
    KeySymbol { name: "x", code: 0x1B, label: "X" },
    KeySymbol { name: "y", code: 0x1C, label: "Y" },
    KeySymbol { name: "z", code: 0x1D, label: "Z" },
    KeySymbol { name: "1", code: 0x1E, label: "1" },
    KeySymbol { name: "2", code: 0x1F, label: "2" },
    KeySymbol { name: "3", code: 0x20, label: "3" },
    KeySymbol { name: "4", code: 0x21, label: "4" },
    KeySymbol { name: "5", code: 0x22, label: "5" },
    KeySymbol { name: "6", code: 0x23, label: "6" },
    KeySymbol { name: "7", code: 0x24, label: "7" },
    KeySymbol { name: "8", code: 0x25, label: "8" },
    KeySymbol { name: "9", code: 0x26, label: "9" },
    KeySymbol { name: "0", code: 0x27, label: "0" },
    KeySymbol { name: "enter", code: 0x28, label: "Enter" },
    KeySymbol { name: "return", code: 0x28, label: "Enter" },
    KeySymbol { name: "esc", code: 0x29, label: "ESC" },
    KeySymbol { name: "escape", code: 0x29, label: "ESC" },
    KeySymbol { name: "backspace", code: 0x2A, label: "Bksp" },
    KeySymbol { name: "bksp", code: 0x2A, label: "Bksp" },
    KeySymbol { name: "tab", code: 0x2B, label: "Tab" },
    KeySymbol { name: "space", code: 0x2C, label: "Space" },
    KeySymbol { name: "-", code: 0x2D, label: "-" },
    KeySymbol { name: "minus", code: 0x2D, label: "-" },
    KeySymbol { name: "=", code: 0x2E, label: "=" },
    KeySymbol { name: "equal", code: 0x2E, label: "=" },
    KeySymbol { name: "[", code: 0x2F, label: "[" },
    KeySymbol { name: "lbracket", code: 0x2F, label: "[" },
    KeySymbol { name: "]", code: 0x30, label: "]" },
    KeySymbol { name: "rbracket", code: 0x30, label: "]" },
    KeySymbol { name: "\\", code: 0x31, label: "\\" },
    KeySymbol { name: "backslash", code: 0x31, label: "\\" },
    KeySymbol { name: ";", code: 0x33, label: ";" },
    KeySymbol { name: "semicolon", code: 0x33, label: ";" },
    KeySymbol { name: "'", code: 0x34, label: "'" },
    KeySymbol { name: "quote", code: 0x34, label: "'" },
    KeySymbol { name: "`", code: 0x35, label: "`" },
    KeySymbol { name: "grave", code: 0x35, label: "`" },
    KeySymbol { name: ",", code: 0x36, label: "," },
    KeySymbol { name: "comma", code: 0x36, label: "," },
    KeySymbol { name: ".", code: 0x37, label: "." },
    KeySymbol { name: "period", code: 0x37, label: "." },
    KeySymbol { name: "/", code: 0x38, label: "/" },
    KeySymbol { name: "slash", code: 0x38, label: "/" },
    KeySymbol { name: "capslock", code: 0x39, label: "Caps" },
    KeySymbol { name: "f1", code: 0x3A, label: "F1" },
    KeySymbol { name: "f2", code: 0x3B, label: "F2" },
    KeySymbol { name: "f3", code: 0x3C, label: "F3" },
    KeySymbol { name: "f4", code: 0x3D, label: "F4" },
    KeySymbol { name: "f5", code: 0x3E, label: "F5" },
    KeySymbol { name: "f6", code: 0x3F, label: "F6" },
    KeySymbol { name: "f7", code: 0x40, label: "F7" },
    KeySymbol { name: "f8", code: 0x41, label: "F8" },
    KeySymbol { name: "f9", code: 0x42, label: "F9" },
    KeySymbol { name: "f10", code: 0x43, label: "F10" },
    KeySymbol { name: "f11", code: 0x44, label: "F11" },
    KeySymbol { name: "f12", code: 0x45, label: "F12" },
    KeySymbol { name: "printscreen", code: 0x46, label: "PrtSc" },
    KeySymbol { name: "scrolllock", code: 0x47, label: "ScrLk" },
    KeySymbol { name: "pause", code: 0x48, label: "Pause" },
    KeySymbol { name: "insert", code: 0x49, label: "Ins" },
    KeySymbol { name: "home", code: 0x4A, label: "Home" },
    KeySymbol { name: "pgup", code: 0x4B, label: "PgUp" },
    KeySymbol { name: "pageup", code: 0x4B, label: "PgUp" },
    KeySymbol { name: "delete", code: 0x4C, label: "DEL" },
    KeySymbol { name: "del", code: 0x4C, label: "DEL" },
    KeySymbol { name: "end", code: 0x4D, label: "End" },
    KeySymbol { name: "pgdn", code: 0x4E, label: "PgDn" },
    KeySymbol { name: "pagedown", code: 0x4E, label: "PgDn" },
    KeySymbol { name: "right", code: 0x4F, label: "Right" },
    KeySymbol { name: "left", code: 0x50, label: "Left" },
    KeySymbol { name: "down", code: 0x51, label: "Down" },
    KeySymbol { name: "up", code: 0x52, label: "Up" },
    KeySymbol { name: "numlock", code: 0x53, label: "NumLk" },
    KeySymbol { name: "kp_slash", code: 0x54, label: "KP/" },
    KeySymbol { name: "kp_asterisk", code: 0x55, label: "KP*" },
    KeySymbol { name: "kp_minus", code: 0x56, label: "KP-" },
    KeySymbol { name: "kp_plus", code: 0x57, label: "KP+" },
    KeySymbol { name: "kp_enter", code: 0x58, label: "KPEnt" },
    KeySymbol { name: "kp1", code: 0x59, label: "KP1" },
    KeySymbol { name: "kp2", code: 0x5A, label: "KP2" },
    KeySymbol { name: "kp3", code: 0x5B, label: "KP3" },
    KeySymbol { name: "kp4", code: 0x5C, label: "KP4" },
    KeySymbol { name: "kp5", code: 0x5D, label: "KP5" },
    KeySymbol { name: "kp6", code: 0x5E, label: "KP6" },
    KeySymbol { name: "kp7", code: 0x5F, label: "KP7" },
    KeySymbol { name: "kp8", code: 0x60, label: "KP8" },
    KeySymbol { name: "kp9", code: 0x61, label: "KP9" },
    KeySymbol { name: "kp0", code: 0x62, label: "KP0" },
    KeySymbol { name: "kp_period", code: 0x63, label: "KP." },
    KeySymbol { name: "menu", code: 0x65, label: "Menu" },
    KeySymbol { name: "f13", code: 0x68, label: "F13" },
    KeySymbol { name: "f14", code: 0x69, label: "F14" },
    KeySymbol { name: "f15", code: 0x6A, label: "F15" },
    KeySymbol { name: "f16", code: 0x6B, label: "F16" },
    KeySymbol { name: "f17", code: 0x6C, label: "F17" },
    KeySymbol { name: "f18", code: 0x6D, label: "F18" },
    KeySymbol { name: "f19", code: 0x6E, label: "F19" },
    KeySymbol { name: "f20", code: 0x6F, label: "F20" },
    KeySymbol { name: "f21", code: 0x70, label: "F21" },
    KeySymbol { name: "f22", code: 0x71, label: "F22" },
    KeySymbol { name: "f23", code: 0x72, label: "F23" },
    KeySymbol { name: "f24", code: 0x73, label: "F24" },
    KeySymbol { name: "mute", code: 0x7F, label: "Mute" },
    KeySymbol { name: "volup", code: 0x80, label: "Vol+" },
    KeySymbol { name: "voldown", code: 0x81, label: "Vol-" },
];

/// Resolve a configuration key name to its usage code.
pub fn lookup(name: &str) -> Option<u8> {
    KEY_TABLE
        .iter()
        .find(|sym| sym.name.eq_ignore_ascii_case(name))
        .map(|sym| sym.code)
}

/// Legend for a usage code, if the table knows it.
pub fn label_for(code: u8) -> Option<&'static str> {
    if code == KEY_NONE {
        return None;
    }
    KEY_TABLE
        .iter()
        .find(|sym| sym.code == code)
        .map(|sym| sym.label)
}

/// Usage code of a digit key `1..=9`, `0`.
pub const fn digit(n: u8) -> u8 {
    match n {
        0 => 0x27,
        n => KEY_1 + (n - 1),
    }
}
