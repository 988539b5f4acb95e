//! Builds a [`KeymapCollection`] from `config.json`.
//!
//! Document shape:
//!
//! ```text
//! [ { "name": "Blender",
//!     "layers": [ { "name": "Edit",
//!                   "base": [cell, ...],
//!                   "mod":  [cell, ...] } ] } ]
//!
//! cell = "g"                                  (shorthand for {"v": "g"})
//!      | { "t": "hid" | "action" | "mod",     (default "hid")
//!          "v": "<key or action name>",
//!          "m": "lctrl+lshft",                (tokens, substring matched)
//!          "l": "<legend>",
//!          "p": true }                        (mod: toggle instead of hold)
//! ```
//!
//! The document is walked with `serde` visitors that build keymaps as they
//! go; no JSON tree is ever held. Everything beyond [`MAX_KEYMAPS`],
//! [`MAX_LAYERS`] or the grid size is skipped without being stored, so the
//! heap used depends on those limits and not on the file. Values of the
//! wrong shape are logged and skipped. The result always contains the
//! system keymap.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};

use super::{empty_grid, Action, Grid, Keymap, KeymapCollection, Layer, Macro};
use crate::config::{
    KEY_COUNT, MAX_CONFIG_FILE_SIZE, MAX_KEYMAPS, MAX_LABEL_CHARS, MAX_LAYERS, MAX_NAME_CHARS,
};
use crate::error::ConfigError;
use crate::hid::keyboard::{
    MOD_LEFT_ALT, MOD_LEFT_CTRL, MOD_LEFT_GUI, MOD_LEFT_SHIFT, MOD_RIGHT_ALT, MOD_RIGHT_CTRL,
    MOD_RIGHT_GUI, MOD_RIGHT_SHIFT,
};
use crate::hid::keycodes::{self, KEY_NONE};

/// Keymap name used when a keymap object carries none.
pub const UNNAMED_KEYMAP: &str = "Unnamed";

const MODIFIER_TOKENS: &[(&str, u8)] = &[
    ("lctrl", MOD_LEFT_CTRL),
    ("rctrl", MOD_RIGHT_CTRL),
    ("lshft", MOD_LEFT_SHIFT),
    ("rshft", MOD_RIGHT_SHIFT),
    ("lalt", MOD_LEFT_ALT),
    ("ralt", MOD_RIGHT_ALT),
    ("lgui", MOD_LEFT_GUI),
    ("rgui", MOD_RIGHT_GUI),
];

/// Parse the raw file contents into the user keymaps.
pub fn parse_document(bytes: &[u8]) -> Result<Vec<Keymap>, ConfigError> {
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::TooLarge);
    }
    let Document(keymaps) = serde_json::from_slice(bytes).map_err(|_| ConfigError::Malformed)?;
    keymaps
}

/// Build the collection from the raw file, if there is one. Any document
/// level failure yields just the system keymap.
pub fn load_document(bytes: Option<&[u8]>) -> KeymapCollection {
    match bytes.ok_or(ConfigError::Missing).and_then(parse_document) {
        Ok(keymaps) => {
            info!("config: {} user keymap(s) loaded", keymaps.len());
            KeymapCollection::new(keymaps)
        }
        Err(e) => {
            warn!("config: {}, using system keymap only", e);
            KeymapCollection::new(Vec::new())
        }
    }
}

/// OR together every modifier token found anywhere in `tokens`.
pub fn parse_modifiers(tokens: &str) -> u8 {
    MODIFIER_TOKENS
        .iter()
        .filter(|(token, _)| tokens.contains(token))
        .fold(0, |bits, (_, bit)| bits | bit)
}

fn clipped(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn hid_macro(name: Option<&str>, modifiers: Option<&str>, label: Option<&str>) -> Macro {
    let keycode = match name {
        Some(name) => keycodes::lookup(name).unwrap_or_else(|| {
            debug!("config: unknown key name");
            KEY_NONE
        }),
        None => KEY_NONE,
    };

    Macro::HidKey {
        modifier: modifiers.map(parse_modifiers).unwrap_or(0),
        keycode,
        label: label.map(|l| clipped(l, MAX_LABEL_CHARS)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Visitors
// ═══════════════════════════════════════════════════════════════════════════

/// Visitor methods for JSON shapes the visitor has no use for. The value is
/// consumed and `$value` returned.
macro_rules! skip_shapes {
    (@bool $value:expr) => {
        fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
            Ok($value)
        }
    };
    (@numbers $value:expr) => {
        fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
            Ok($value)
        }
        fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
            Ok($value)
        }
        fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
            Ok($value)
        }
    };
    (@unit $value:expr) => {
        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok($value)
        }
    };
    (@str $value:expr) => {
        fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
            Ok($value)
        }
    };
    (@seq $lt:lifetime, $value:expr) => {
        fn visit_seq<A: SeqAccess<$lt>>(self, seq: A) -> Result<Self::Value, A::Error> {
            IgnoredAny.visit_seq(seq)?;
            Ok($value)
        }
    };
    (@map $lt:lifetime, $value:expr) => {
        fn visit_map<A: MapAccess<$lt>>(self, map: A) -> Result<Self::Value, A::Error> {
            IgnoredAny.visit_map(map)?;
            Ok($value)
        }
    };
    ($lt:lifetime, $value:expr; scalars) => {
        skip_shapes!(@bool $value);
        skip_shapes!(@numbers $value);
        skip_shapes!(@unit $value);
    };
    ($lt:lifetime, $value:expr; scalars, str) => {
        skip_shapes!($lt, $value; scalars);
        skip_shapes!(@str $value);
    };
    ($lt:lifetime, $value:expr; scalars, seq) => {
        skip_shapes!($lt, $value; scalars);
        skip_shapes!(@seq $lt, $value);
    };
    ($lt:lifetime, $value:expr; scalars, str, seq) => {
        skip_shapes!($lt, $value; scalars, str);
        skip_shapes!(@seq $lt, $value);
    };
    ($lt:lifetime, $value:expr; scalars, str, map) => {
        skip_shapes!($lt, $value; scalars, str);
        skip_shapes!(@map $lt, $value);
    };
}

/// Object keys the loader knows about.
enum Field {
    Name,
    Layers,
    Base,
    Mod,
    Overlay,
    Type,
    Value,
    Modifiers,
    Label,
    Persistent,
    Other,
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldVisitor;

        impl<'de> Visitor<'de> for FieldVisitor {
            type Value = Field;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object key")
            }

            fn visit_str<E: de::Error>(self, key: &str) -> Result<Field, E> {
                Ok(match key {
                    "name" => Field::Name,
                    "layers" => Field::Layers,
                    "base" => Field::Base,
                    "mod" => Field::Mod,
                    "overlay" => Field::Overlay,
                    "t" => Field::Type,
                    "v" => Field::Value,
                    "m" => Field::Modifiers,
                    "l" => Field::Label,
                    "p" => Field::Persistent,
                    _ => Field::Other,
                })
            }
        }

        deserializer.deserialize_identifier(FieldVisitor)
    }
}

/// A cell or name value: strings and booleans are kept, anything else is
/// consumed and forgotten. Strings without escapes borrow from the file.
enum Scalar<'de> {
    Text(Cow<'de, str>),
    Flag(bool),
    Other,
}

impl Scalar<'_> {
    fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(&**text),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Scalar<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = Scalar<'de>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a boolean")
            }

            fn visit_bool<E: de::Error>(self, flag: bool) -> Result<Self::Value, E> {
                Ok(Scalar::Flag(flag))
            }

            fn visit_borrowed_str<E: de::Error>(self, text: &'de str) -> Result<Self::Value, E> {
                Ok(Scalar::Text(Cow::Borrowed(text)))
            }

            fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
                Ok(Scalar::Text(Cow::Owned(String::from(text))))
            }

            fn visit_string<E: de::Error>(self, text: String) -> Result<Self::Value, E> {
                Ok(Scalar::Text(Cow::Owned(text)))
            }

            skip_shapes!(@numbers Scalar::Other);
            skip_shapes!(@unit Scalar::Other);
            skip_shapes!(@seq 'de, Scalar::Other);
            skip_shapes!(@map 'de, Scalar::Other);
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

fn text<'a>(value: &'a Option<Scalar<'_>>) -> Option<&'a str> {
    value.as_ref().and_then(Scalar::as_str)
}

/// Top level: the array of keymaps.
struct Document(Result<Vec<Keymap>, ConfigError>);

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = Result<Vec<Keymap>, ConfigError>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of keymaps")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut keymaps = Vec::new();
                let mut index = 0usize;
                loop {
                    if keymaps.len() < MAX_KEYMAPS {
                        match seq.next_element::<KeymapEntry>()? {
                            Some(KeymapEntry(Ok(keymap))) => keymaps.push(keymap),
                            Some(KeymapEntry(Err(e))) => {
                                warn!("config: keymap {} skipped: {}", index, e)
                            }
                            None => break,
                        }
                    } else if seq.next_element::<IgnoredAny>()?.is_some() {
                        warn!("config: keymap {} skipped: limit of {}", index, MAX_KEYMAPS);
                    } else {
                        break;
                    }
                    index += 1;
                }
                Ok(Ok(keymaps))
            }

            skip_shapes!('de, Err(ConfigError::NotAnArray); scalars, str, map);
        }

        deserializer.deserialize_any(DocumentVisitor).map(Document)
    }
}

/// One element of the keymap array.
pub(super) struct KeymapEntry(pub(super) Result<Keymap, ConfigError>);

impl<'de> Deserialize<'de> for KeymapEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeymapVisitor;

        impl<'de> Visitor<'de> for KeymapVisitor {
            type Value = Result<Keymap, ConfigError>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a keymap object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut name = None;
                let mut layers = None;
                while let Some(field) = map.next_key::<Field>()? {
                    match field {
                        Field::Name => {
                            name = map
                                .next_value::<Scalar>()?
                                .as_str()
                                .map(|n| clipped(n, MAX_NAME_CHARS));
                        }
                        Field::Layers => layers = map.next_value::<LayerList>()?.0,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }

                let Some(layers) = layers else {
                    return Ok(Err(ConfigError::MissingLayers));
                };
                let name = name.unwrap_or_else(|| String::from(UNNAMED_KEYMAP));
                Ok(Keymap::new(name, layers))
            }

            skip_shapes!('de, Err(ConfigError::NotAnObject); scalars, str, seq);
        }

        deserializer.deserialize_any(KeymapVisitor).map(KeymapEntry)
    }
}

/// A keymap's `layers` array; `None` when it is not an array.
struct LayerList(Option<Vec<Layer>>);

impl<'de> Deserialize<'de> for LayerList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LayerListVisitor;

        impl<'de> Visitor<'de> for LayerListVisitor {
            type Value = Option<Vec<Layer>>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of layers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut layers = Vec::new();
                let mut index = 0usize;
                loop {
                    if layers.len() < MAX_LAYERS {
                        match seq.next_element::<LayerEntry>()? {
                            Some(LayerEntry(Ok(layer))) => layers.push(layer),
                            Some(LayerEntry(Err(e))) => {
                                warn!("config: layer {} skipped: {}", index, e)
                            }
                            None => break,
                        }
                    } else if seq.next_element::<IgnoredAny>()?.is_some() {
                        warn!("config: layer {} skipped: limit of {}", index, MAX_LAYERS);
                    } else {
                        break;
                    }
                    index += 1;
                }
                Ok(Some(layers))
            }

            skip_shapes!('de, None; scalars, str, map);
        }

        deserializer.deserialize_any(LayerListVisitor).map(LayerList)
    }
}

/// One layer object. `base` is required; the overlay grid may be given as
/// `mod` or `overlay`.
pub(super) struct LayerEntry(pub(super) Result<Layer, ConfigError>);

impl<'de> Deserialize<'de> for LayerEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LayerVisitor;

        impl<'de> Visitor<'de> for LayerVisitor {
            type Value = Result<Layer, ConfigError>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a layer object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut name = None;
                let mut base = None;
                let mut modded = None;
                let mut overlay = None;
                while let Some(field) = map.next_key::<Field>()? {
                    match field {
                        Field::Name => {
                            name = map
                                .next_value::<Scalar>()?
                                .as_str()
                                .map(|n| clipped(n, MAX_NAME_CHARS));
                        }
                        Field::Base => base = map.next_value::<GridCells>()?.0,
                        Field::Mod => modded = map.next_value::<GridCells>()?.0,
                        Field::Overlay => overlay = map.next_value::<GridCells>()?.0,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }

                let Some(base) = base else {
                    return Ok(Err(ConfigError::MissingBase));
                };
                Ok(Ok(Layer {
                    name,
                    base,
                    overlay: modded.or(overlay).unwrap_or_else(empty_grid),
                }))
            }

            skip_shapes!('de, Err(ConfigError::NotAnObject); scalars, str, seq);
        }

        deserializer.deserialize_any(LayerVisitor).map(LayerEntry)
    }
}

/// A grid filled positionally. Extra cells are skipped, missing ones stay
/// `None`. `None` overall when the value is not an array.
pub(super) struct GridCells(pub(super) Option<Grid>);

impl<'de> Deserialize<'de> for GridCells {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GridVisitor;

        impl<'de> Visitor<'de> for GridVisitor {
            type Value = Option<Grid>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of cells")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut grid = empty_grid();
                let mut filled = 0;
                loop {
                    if filled < KEY_COUNT {
                        let Some(Cell(macro_)) = seq.next_element::<Cell>()? else {
                            break;
                        };
                        grid[filled] = macro_;
                        filled += 1;
                    } else if seq.next_element::<IgnoredAny>()?.is_none() {
                        break;
                    }
                }
                Ok(Some(grid))
            }

            skip_shapes!('de, None; scalars, str, map);
        }

        deserializer.deserialize_any(GridVisitor).map(GridCells)
    }
}

/// One grid cell. Anything unrecognised becomes [`Macro::None`].
pub(super) struct Cell(pub(super) Macro);

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CellVisitor;

        impl<'de> Visitor<'de> for CellVisitor {
            type Value = Macro;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a key name or a cell object")
            }

            fn visit_str<E: de::Error>(self, name: &str) -> Result<Macro, E> {
                Ok(hid_macro(Some(name), None, None))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Macro, A::Error> {
                let mut kind = None;
                let mut value = None;
                let mut modifiers = None;
                let mut label = None;
                let mut persistent = None;
                while let Some(field) = map.next_key::<Field>()? {
                    match field {
                        Field::Type => kind = Some(map.next_value::<Scalar>()?),
                        Field::Value => value = Some(map.next_value::<Scalar>()?),
                        Field::Modifiers => modifiers = Some(map.next_value::<Scalar>()?),
                        Field::Label => label = Some(map.next_value::<Scalar>()?),
                        Field::Persistent => {
                            persistent = map.next_value::<Scalar>()?.as_bool();
                        }
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }

                let macro_ = match text(&kind).unwrap_or("hid") {
                    "hid" => hid_macro(text(&value), text(&modifiers), text(&label)),
                    "action" => match text(&value).and_then(Action::from_name) {
                        Some(action) => Macro::Action(action),
                        None => {
                            debug!("config: unknown action");
                            Macro::None
                        }
                    },
                    "mod" => Macro::Modifier {
                        persistent: persistent.unwrap_or(false),
                    },
                    _ => Macro::None,
                };
                Ok(macro_)
            }

            skip_shapes!('de, Macro::None; scalars, seq);
        }

        deserializer.deserialize_any(CellVisitor).map(Cell)
    }
}
