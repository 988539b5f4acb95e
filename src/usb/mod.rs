//! USB device subsystem.
//!
//! The RP2040's USB 1.1 controller is driven by `embassy-usb`. One
//! composite device carries two interfaces:
//!
//! - Interface 0: Keyboard (boot protocol HID)
//! - Interface 1: Mass storage (Bulk-Only Transport, SCSI transparent)
//!
//! The active personality decides which one is live: reports are only
//! offered to the keyboard in keypad mode, and the storage unit only has a
//! medium loaded in configuration mode. Switching personality detaches
//! from the bus so the host enumerates again.

pub mod scsi;

#[cfg(feature = "embedded")]
pub mod device;
#[cfg(feature = "embedded")]
pub mod msc;
