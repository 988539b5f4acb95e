//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, geometry and storage
//! constants live here so they can be tuned in one place.

// Key matrix

/// Number of matrix rows (driven outputs, top to bottom).
pub const MATRIX_ROWS: usize = 3;

/// Number of matrix columns (sampled inputs, left to right).
pub const MATRIX_COLS: usize = 3;

/// Total number of key cells.
pub const KEY_COUNT: usize = MATRIX_ROWS * MATRIX_COLS;

// Per-cell state is kept in a `u32` bitmask.
const _: () = assert!(KEY_COUNT <= 32);

/// Minimum spacing between two matrix scans (ms). Two agreeing scans are
/// needed to commit a change, so this also bounds the debounce latency.
pub const MATRIX_SCAN_INTERVAL_MS: u64 = 10;

/// Settle time after driving a row before sampling the columns (µs).
pub const MATRIX_ROW_SETTLE_US: u32 = 10;

/// Recovery time after releasing a row (µs).
pub const MATRIX_ROW_RELEASE_US: u32 = 50;

// Display

/// OLED width in pixels.
pub const DISPLAY_WIDTH: u16 = 128;

/// OLED height in pixels.
pub const DISPLAY_HEIGHT: u16 = 32;

/// Glyph cell of the display font.
pub const FONT_WIDTH: u16 = 5;
pub const FONT_HEIGHT: u16 = 8;

/// Default contrast and the step applied by the brightness actions.
pub const BRIGHTNESS_DEFAULT: u8 = 5;
pub const BRIGHTNESS_STEP: u8 = 5;
pub const BRIGHTNESS_MIN: u8 = 5;
pub const BRIGHTNESS_MAX: u8 = 255;

/// Screen stays on this long after the last input while the host is attached.
pub const SCREEN_TIMEOUT_CONNECTED_MS: u64 = 15 * 60 * 1000;

/// Screen stays on this long after the last input without a host.
pub const SCREEN_TIMEOUT_DISCONNECTED_MS: u64 = 10 * 1000;

/// After waking the screen, key activity must be quiet this long before
/// macros are resolved again.
pub const INPUT_SETTLE_MS: u64 = 150;

// Analog stick

/// Full-scale value of the 12-bit ADC.
pub const ADC_FULL_SCALE: u16 = 4096;

// Virtual disk

/// Number of sectors exposed over USB mass storage.
pub const DISK_SECTOR_COUNT: usize = 128;

/// Bytes per sector.
pub const DISK_SECTOR_SIZE: usize = 512;

/// Bumped whenever the on-flash image layout changes.
pub const DISK_FORMAT_VERSION: u8 = 1;

/// Flash program granularity used by the flush.
pub const FLASH_PAGE_SIZE: usize = 256;

/// Flash erase granularity.
pub const FLASH_ERASE_SIZE: usize = 4096;

/// Erase blocks reserved for the disk image.
pub const DISK_FLASH_BLOCKS: usize = 17;

/// Total on-chip flash size (Raspberry Pi Pico).
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the disk image from the start of flash.
pub const DISK_FLASH_OFFSET: u32 = (FLASH_SIZE - FLASH_ERASE_SIZE * DISK_FLASH_BLOCKS) as u32;

/// Upper bound on the size of `config.json` that will be read and parsed.
pub const MAX_CONFIG_FILE_SIZE: usize = 16 * 1024;

/// User keymaps kept from the configuration; later ones are skipped.
pub const MAX_KEYMAPS: usize = 8;

/// Layers kept per keymap; later ones are skipped.
pub const MAX_LAYERS: usize = 4;

/// Keymap and layer names are cut to one display line.
pub const MAX_NAME_CHARS: usize = (DISPLAY_WIDTH / FONT_WIDTH) as usize;

/// Custom legends are cut to what fits inside a grid cell.
pub const MAX_LABEL_CHARS: usize = 8;

/// Heap for the RAM disk image and the parsed keymaps.
pub const HEAP_SIZE: usize = 160 * 1024;

/// Name of the configuration document on the virtual disk.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Name of the usage notes seeded next to it.
pub const README_FILE_NAME: &str = "readme.txt";

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0002;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "macropad";
pub const USB_PRODUCT: &str = "Macro Keypad";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// USB HID polling interval (ms).
pub const USB_HID_POLL_MS: u8 = 1;

/// SCSI INQUIRY identity strings (space padded by the responder).
pub const MSC_VENDOR_ID: &str = "macropad";
pub const MSC_PRODUCT_ID: &str = "Config Drive";
pub const MSC_PRODUCT_REV: &str = "1.0";

// GPIO pin assignments (Raspberry Pi Pico)
//
// These are logical names; the actual `embassy_rp::peripherals::*` are
// selected in `main.rs`. Adjust for your custom PCB.
//
//   Matrix rows     → GP6, GP7, GP8   (outputs, top to bottom)
//   Matrix columns  → GP5, GP4, GP3   (inputs with pull-down, left to right)
//   I²C SDA         → GP16
//   I²C SCL         → GP17
//   Stick X / Y     → GP26 / GP27     (ADC0 / ADC1)

/// I²C address of the SSD1306.
pub const DISPLAY_I2C_ADDRESS: u8 = 0x3C;

/// Main loop period (ms).
pub const MAIN_LOOP_PERIOD_MS: u64 = 5;
