//! Unified error types for the keypad firmware.
//!
//! We avoid heap payloads - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Storage
    /// Flash read/erase/program failed. There is no retry path: the caller
    /// must treat this as fatal rather than run with a half-written region.
    Storage,

    /// The reserved flash region cannot hold the disk image, or is not
    /// aligned to the flash erase size.
    RegionTooSmall,

    // Block device
    /// Logical block address beyond the last sector.
    LbaOutOfRange,

    /// Transfer did not cover exactly one whole sector.
    PartialSector,

    /// No free cluster or directory slot left for a new file.
    DiskFull,
}

/// Why a configuration document (or part of it) was rejected.
///
/// Never fatal: the loader logs the reason and skips the offending node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `config.json` is not on the disk.
    Missing,
    /// The document is not valid JSON.
    Malformed,
    /// The file exceeds the parse limit.
    TooLarge,
    /// The top level is not an array.
    NotAnArray,
    /// A keymap or layer entry is not an object.
    NotAnObject,
    /// A keymap has no `layers` array.
    MissingLayers,
    /// A layer has no `base` array.
    MissingBase,
    /// Every layer of a keymap was rejected.
    NoLayers,
}
