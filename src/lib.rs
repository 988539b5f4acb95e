//! Macro keypad firmware core.
//!
//! Every module here is hardware-independent and tested on the host with
//! `cargo test`. The embedded binary (`main.rs`, `--features embedded`)
//! wires these modules to the RP2040 peripherals.
//!
//! ## Components
//!
//! - **input**: debounced key matrix scanning and analog stick gestures
//! - **keymap**: keymaps, layers and macros, loaded from `config.json`
//! - **engine**: macro resolution and keyboard report emission
//! - **disk**: flash-backed FAT32 virtual disk exposed over mass storage
//! - **controller**: keypad / configuration mode state machine
//! - **ui**: key legend rendering
//! - **usb**: SCSI command handling and the USB device (embedded only)

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod config;
pub mod controller;
pub mod disk;
pub mod engine;
pub mod error;
pub mod hid;
pub mod input;
pub mod keymap;
pub mod power_logic;
pub mod ui;
pub mod usb;

#[cfg(test)]
mod testutil;

pub use controller::{Mode, ModeController, UsbFeatures, UsbPort};
pub use error::{ConfigError, Error};
