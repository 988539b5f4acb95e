//! In-memory stand-ins for the hardware seams, shared by unit tests.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use crate::controller::{UsbFeatures, UsbPort};
use crate::disk::ConfigStore;
use crate::error::Error;
use crate::hid::{HidSink, KeyboardReport};
use crate::ui::{Justify, Screen};

/// NOR flash backed by a byte vector. Erased bytes read 0xFF and a program
/// can only clear bits.
pub struct RamFlash {
    data: Vec<u8>,
    erases: usize,
    writes: Vec<(u32, usize)>,
    fail_writes: bool,
}

impl RamFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            erases: 0,
            writes: Vec::new(),
            fail_writes: false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of erase calls.
    pub fn erase_count(&self) -> usize {
        self.erases
    }

    /// `(offset, len)` of every program call.
    pub fn writes(&self) -> &[(u32, usize)] {
        &self.writes
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        self.erases += 1;
        self.data[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        self.writes.push((offset, bytes.len()));
        let start = offset as usize;
        for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }
}

/// One call made on a [`RecordingScreen`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawOp {
    Clear,
    Text {
        text: String,
        x: i32,
        y: i32,
        max_width: u32,
        justify: Justify,
        on: bool,
    },
    Rect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        on: bool,
    },
    Present,
}

#[derive(Default)]
pub struct RecordingScreen {
    pub ops: Vec<DrawOp>,
    /// Last contrast written.
    pub contrast: Option<u8>,
    pub contrast_calls: usize,
}

impl RecordingScreen {
    pub fn has_text(&self, needle: &str) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, DrawOp::Text { text, .. } if text == needle))
    }

    pub fn presents(&self) -> usize {
        self.ops.iter().filter(|op| **op == DrawOp::Present).count()
    }
}

impl Screen for RecordingScreen {
    fn clear(&mut self) {
        self.ops.push(DrawOp::Clear);
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, max_width: u32, justify: Justify, on: bool) {
        self.ops.push(DrawOp::Text {
            text: String::from(text),
            x,
            y,
            max_width,
            justify,
            on,
        });
    }

    fn draw_rect(&mut self, x: i32, y: i32, width: u32, height: u32, on: bool) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            width,
            height,
            on,
        });
    }

    fn present(&mut self) {
        self.ops.push(DrawOp::Present);
    }

    fn set_contrast(&mut self, level: u8) {
        self.contrast = Some(level);
        self.contrast_calls += 1;
    }
}

pub struct RecordingHid {
    pub ready: bool,
    pub reports: Vec<KeyboardReport>,
}

impl RecordingHid {
    pub fn ready() -> Self {
        Self {
            ready: true,
            reports: Vec::new(),
        }
    }
}

impl HidSink for RecordingHid {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn send_report(&mut self, report: &KeyboardReport) {
        self.reports.push(*report);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbCall {
    SetFeatures(UsbFeatures),
    RemoteWakeup,
    ResetToBootloader,
}

#[derive(Default)]
pub struct RecordingUsb {
    pub calls: Vec<UsbCall>,
}

impl UsbPort for RecordingUsb {
    fn set_features(&mut self, features: UsbFeatures) {
        self.calls.push(UsbCall::SetFeatures(features));
    }

    fn remote_wakeup(&mut self) {
        self.calls.push(UsbCall::RemoteWakeup);
    }

    fn reset_to_bootloader(&mut self) {
        self.calls.push(UsbCall::ResetToBootloader);
    }
}

/// Configuration held in memory; counts flushes.
#[derive(Default)]
pub struct MemoryStore {
    pub config: Option<Vec<u8>>,
    pub flushes: usize,
}

impl MemoryStore {
    pub fn with_config(config: &str) -> Self {
        Self {
            config: Some(config.as_bytes().to_vec()),
            flushes: 0,
        }
    }
}

impl ConfigStore for MemoryStore {
    fn read_config(&mut self) -> Option<Vec<u8>> {
        self.config.clone()
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.flushes += 1;
        Ok(())
    }
}
