//! End-to-end scenarios for the keypad core: configuration loading, the
//! scanned matrix driving the mode controller, and the flash-backed disk.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use macropad::config::{CONFIG_FILE_NAME, DISK_SECTOR_SIZE, MATRIX_COLS, MATRIX_ROWS};
use macropad::disk::{DiskLock, Mount, VirtualDisk, REGION_SIZE};
use macropad::hid::keycodes;
use macropad::hid::{HidSink, KeyboardReport};
use macropad::input::{GestureDetector, InputSnapshot, KeyMatrix, StickSample};
use macropad::keymap::{loader, Macro};
use macropad::ui::{Justify, Screen};
use macropad::{Mode, ModeController, UsbFeatures, UsbPort};

// ═══════════════════════════════════════════════════════════════════════════
// Fakes
// ═══════════════════════════════════════════════════════════════════════════

struct RamFlash {
    data: Vec<u8>,
    erases: usize,
}

impl RamFlash {
    fn new() -> Self {
        Self {
            data: vec![0xFF; REGION_SIZE],
            erases: 0,
        }
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
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        self.erases += 1;
        self.data[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        let start = offset as usize;
        for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }
}

#[derive(Default)]
struct TextScreen {
    texts: Vec<String>,
}

impl TextScreen {
    fn shows(&self, text: &str) -> bool {
        self.texts.iter().any(|t| t == text)
    }
}

impl Screen for TextScreen {
    fn clear(&mut self) {
        self.texts.clear();
    }

    fn draw_text(&mut self, text: &str, _x: i32, _y: i32, _w: u32, _j: Justify, _on: bool) {
        self.texts.push(text.to_string());
    }

    fn draw_rect(&mut self, _x: i32, _y: i32, _w: u32, _h: u32, _on: bool) {}

    fn present(&mut self) {}

    fn set_contrast(&mut self, _level: u8) {}
}

#[derive(Default)]
struct Keyboard {
    reports: Vec<KeyboardReport>,
}

impl HidSink for Keyboard {
    fn is_ready(&self) -> bool {
        true
    }

    fn send_report(&mut self, report: &KeyboardReport) {
        self.reports.push(*report);
    }
}

#[derive(Default)]
struct Port {
    features: Vec<UsbFeatures>,
    resets: usize,
}

impl UsbPort for Port {
    fn set_features(&mut self, features: UsbFeatures) {
        self.features.push(features);
    }

    fn remote_wakeup(&mut self) {}

    fn reset_to_bootloader(&mut self) {
        self.resets += 1;
    }
}

/// Which row is driven and which switches are closed.
#[derive(Default)]
struct Wiring {
    driven_row: Cell<Option<usize>>,
    closed: Cell<u32>,
}

impl Wiring {
    fn close(&self, row: usize, col: usize) {
        self.closed.set(self.closed.get() | 1 << (row * MATRIX_COLS + col));
    }

    fn open_all(&self) {
        self.closed.set(0);
    }
}

struct RowPin {
    row: usize,
    wiring: Rc<Wiring>,
}

impl PinErrorType for RowPin {
    type Error = Infallible;
}

impl OutputPin for RowPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        if self.wiring.driven_row.get() == Some(self.row) {
            self.wiring.driven_row.set(None);
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.wiring.driven_row.set(Some(self.row));
        Ok(())
    }
}

struct ColPin {
    col: usize,
    wiring: Rc<Wiring>,
}

impl PinErrorType for ColPin {
    type Error = Infallible;
}

impl InputPin for ColPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(match self.wiring.driven_row.get() {
            Some(row) => self.wiring.closed.get() & 1 << (row * MATRIX_COLS + self.col) != 0,
            None => false,
        })
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

type Matrix = KeyMatrix<RowPin, ColPin, NoDelay>;

fn matrix(wiring: &Rc<Wiring>) -> Matrix {
    let rows: [RowPin; MATRIX_ROWS] = core::array::from_fn(|row| RowPin {
        row,
        wiring: Rc::clone(wiring),
    });
    let cols: [ColPin; MATRIX_COLS] = core::array::from_fn(|col| ColPin {
        col,
        wiring: Rc::clone(wiring),
    });
    KeyMatrix::new(rows, cols, NoDelay)
}

fn mounted_disk(flash: RamFlash) -> (DiskLock<NoopRawMutex, RamFlash>, Mount) {
    let mut disk = VirtualDisk::new(flash, 0).unwrap();
    let mount = disk.mount().unwrap();
    (Mutex::new(RefCell::new(disk)), mount)
}

/// Overwrite `config.json` in place through the block interface, the way a
/// host editing the file would.
fn host_rewrites_config(lock: &DiskLock<NoopRawMutex, RamFlash>, text: &str) {
    assert!(text.len() <= DISK_SECTOR_SIZE);
    const ROOT_SECTOR: u32 = 34;

    lock.lock(|disk| {
        let mut disk = disk.borrow_mut();
        let mut root = [0u8; DISK_SECTOR_SIZE];
        disk.read(ROOT_SECTOR, 0, &mut root).unwrap();

        let entry = root
            .chunks_exact(32)
            .position(|e| &e[..11] == b"CONFIG~1JSO")
            .expect("config.json short entry")
            * 32;
        let cluster = u32::from(u16::from_le_bytes([root[entry + 20], root[entry + 21]])) << 16
            | u32::from(u16::from_le_bytes([root[entry + 26], root[entry + 27]]));

        let mut data = [0u8; DISK_SECTOR_SIZE];
        data[..text.len()].copy_from_slice(text.as_bytes());
        disk.write(ROOT_SECTOR + cluster - 2, 0, &data).unwrap();

        root[entry + 28..entry + 32].copy_from_slice(&(text.len() as u32).to_le_bytes());
        disk.write(ROOT_SECTOR, 0, &root).unwrap();
    });
}

/// Step the controller with the real matrix for `duration_ms`.
fn run(
    controller: &mut ModeController<
        TextScreen,
        Keyboard,
        Port,
        &DiskLock<NoopRawMutex, RamFlash>,
    >,
    matrix: &mut Matrix,
    now: &mut u64,
    duration_ms: u64,
) {
    let end = *now + duration_ms;
    while *now < end {
        let snapshot = matrix.poll(*now);
        controller.update(*now, &snapshot, StickSample::CENTER).unwrap();
        *now += 5;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn empty_document_leaves_only_the_system_keymap() {
    let mut keymaps = loader::load_document(Some(&b"[]"[..]));
    assert_eq!(keymaps.len(), 1);
    assert_eq!(keymaps.active().name(), "System");
    keymaps.cycle(true);
    assert_eq!(keymaps.selected_index(), 0);
    keymaps.cycle(false);
    assert_eq!(keymaps.selected_index(), 0);
}

#[test]
fn digit_grid_resolves_positionally() {
    let doc = br#"[{"name":"Digits","layers":[{"base":["1","2","3","4","5","6","7","8","9"]}]}]"#;
    let keymaps = loader::load_document(Some(&doc[..]));
    assert_eq!(keymaps.len(), 2);

    let layer = &keymaps.keymaps()[0].layers()[0];
    for (i, m) in layer.base.iter().enumerate() {
        match m {
            Macro::HidKey {
                modifier, keycode, ..
            } => {
                assert_eq!(*modifier, 0);
                assert_eq!(*keycode, keycodes::digit(i as u8 + 1));
            }
            other => panic!("cell {i}: {other:?}"),
        }
    }
}

#[test]
fn garbage_configuration_still_boots_with_system_keymap() {
    for doc in [&b"{not json"[..], &b"{}"[..], &b"42"[..], &[0xFFu8; 16][..]] {
        let keymaps = loader::load_document(Some(&doc[..]));
        assert!(!keymaps.is_empty());
        assert_eq!(keymaps.active().name(), "System");
    }
    assert_eq!(loader::load_document(None).len(), 1);
}

#[test]
fn flash_key_shows_notice_persists_and_resets() {
    let (lock, mount) = mounted_disk(RamFlash::new());
    assert_eq!(mount, Mount::Formatted);

    let wiring = Rc::new(Wiring::default());
    let mut keys = matrix(&wiring);
    let mut c = ModeController::new(
        TextScreen::default(),
        Keyboard::default(),
        Port::default(),
        &lock,
        0,
        StickSample::CENTER,
    );

    let mut now = 0;
    run(&mut c, &mut keys, &mut now, 200);
    assert!(c.is_processing_input());
    assert!(c.screen().shows("System"));

    // Bottom-right cell of the system keymap.
    wiring.close(2, 2);
    run(&mut c, &mut keys, &mut now, 30);

    assert!(c.screen().shows("Ready to flash!"));
    assert_eq!(c.usb().resets, 1);
    assert!(c.is_halted());

    // Nothing runs after the reset request.
    let texts = c.screen().texts.clone();
    wiring.open_all();
    run(&mut c, &mut keys, &mut now, 100);
    assert_eq!(c.screen().texts, texts);
    assert_eq!(c.usb().resets, 1);

    // The freshly formatted image was written out before the reset.
    drop(c);
    let flash = lock.into_inner().into_inner().release();
    assert_eq!(flash.erases, 1);
    let (_, mount) = mounted_disk(flash);
    assert_eq!(mount, Mount::Restored);
}

#[test]
fn centred_stick_never_fires() {
    let mut detector = GestureDetector::new(128, 32);
    detector.prime(StickSample::CENTER);
    for _ in 0..100 {
        assert!(detector.update(StickSample::CENTER).is_none());
    }
}

#[test]
fn eject_after_edit_reloads_keymaps_and_persists() {
    let (lock, _) = mounted_disk(RamFlash::new());
    let wiring = Rc::new(Wiring::default());
    let mut keys = matrix(&wiring);
    let mut c = ModeController::new(
        TextScreen::default(),
        Keyboard::default(),
        Port::default(),
        &lock,
        0,
        StickSample::CENTER,
    );

    let mut now = 0;
    run(&mut c, &mut keys, &mut now, 200);

    // Top-left cell of the system keymap enters configuration mode.
    wiring.close(0, 0);
    run(&mut c, &mut keys, &mut now, 30);
    wiring.open_all();
    run(&mut c, &mut keys, &mut now, 30);
    assert_eq!(c.mode(), Mode::Configuring);
    assert_eq!(c.usb().features, [UsbFeatures::STORAGE]);
    assert!(c.screen().shows("Config mode"));

    host_rewrites_config(
        &lock,
        r#"[{"name":"Numbers","layers":[{"base":["7","8","9","4","5","6","1","2","3"]}]}]"#,
    );

    c.storage_ejected(now).unwrap();
    assert_eq!(c.mode(), Mode::Keypad);
    assert_eq!(c.usb().features.last(), Some(&UsbFeatures::KEYBOARD));
    assert_eq!(c.keymaps().len(), 2);
    assert_eq!(c.keymaps().active().name(), "Numbers");

    run(&mut c, &mut keys, &mut now, 200);
    assert!(c.screen().shows("Numbers"));

    // Typing works straight away with the new keymap.
    wiring.close(2, 0);
    run(&mut c, &mut keys, &mut now, 30);
    wiring.open_all();
    run(&mut c, &mut keys, &mut now, 30);
    let mut one = KeyboardReport::empty();
    one.keycodes[0] = keycodes::digit(1);
    assert_eq!(c.hid().reports, [one, KeyboardReport::empty()]);

    // The edit survives a power cycle.
    drop(c);
    let flash = lock.into_inner().into_inner().release();
    let (lock, mount) = mounted_disk(flash);
    assert_eq!(mount, Mount::Restored);
    let config = lock.lock(|d| d.borrow().read_file(CONFIG_FILE_NAME)).unwrap();
    assert!(config.starts_with(br#"[{"name":"Numbers""#));
}

#[test]
fn bounce_shorter_than_the_scan_interval_is_ignored() {
    let wiring = Rc::new(Wiring::default());
    let mut keys = matrix(&wiring);
    assert_eq!(keys.poll(0), InputSnapshot::default());

    wiring.close(1, 1);
    let first = keys.poll(10);
    assert!(!first.any_pressed());
    wiring.open_all();
    let second = keys.poll(20);
    assert!(!second.any_pressed() && !second.any_changed());

    wiring.close(1, 1);
    keys.poll(30);
    let committed = keys.poll(40);
    assert!(committed.pressed_edge(1, 1));
}
