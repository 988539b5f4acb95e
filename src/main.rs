//! macropad - macro keypad firmware for the Raspberry Pi Pico (RP2040).
//!
//! Architecture
//! ────────────
//!   ┌───────────────┐  reports  ┌──────────────┐
//!   │ control loop  │──────────▶│  HID writer  │──▶ USB keyboard
//!   │ (5 ms ticker) │           └──────────────┘
//!   │               │  eject    ┌──────────────┐
//!   │ ModeController│◀──────────│  MSC task    │◀─▶ USB mass storage
//!   └──────┬────────┘           └──────┬───────┘
//!          │        DiskLock           │
//!          └──────────▶ VirtualDisk ◀──┘──▶ on-chip flash (last 68 KiB)
//!
//! Tasks:
//!   1. usb_task       - runs the embassy-usb device, wakeups, re-attach
//!   2. hid_task       - drains the report channel into the HID endpoint
//!   3. msc_task       - Bulk-Only Transport / SCSI against the disk
//!   4. main           - matrix, stick, display, mode controller

#![no_std]
#![no_main]

extern crate alloc;

use core::cell::RefCell;
use core::mem::MaybeUninit;

use defmt::{info, unwrap};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::adc::{Adc, Blocking as AdcBlocking, Channel as AdcChannel, Config as AdcConfig};
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::FLASH;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Delay, Duration, Instant, Ticker};
use embassy_usb::class::hid::HidWriter;
use embassy_usb::UsbDevice;
use embedded_alloc::LlffHeap as Heap;
use panic_probe as _;
use static_cell::StaticCell;

use macropad::config::{DISK_FLASH_OFFSET, FLASH_SIZE, HEAP_SIZE, MAIN_LOOP_PERIOD_MS};
use macropad::disk::{DiskLock, Mount, VirtualDisk};
use macropad::hid::keyboard::KEYBOARD_REPORT_SIZE;
use macropad::input::{KeyMatrix, StickSample};
use macropad::ui::display::OledScreen;
use macropad::usb::device::{self, UsbControl, UsbDriver, UsbKeyboard};
use macropad::usb::msc::MscClass;
use macropad::ModeController;

type DiskFlash = Flash<'static, FLASH, Blocking, FLASH_SIZE>;

#[global_allocator]
static HEAP: Heap = Heap::empty();

static DISK: StaticCell<DiskLock<CriticalSectionRawMutex, DiskFlash>> = StaticCell::new();

#[embassy_executor::task]
async fn usb_task(device: UsbDevice<'static, UsbDriver>) -> ! {
    device::run_usb_device(device).await
}

#[embassy_executor::task]
async fn hid_task(keyboard: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>) -> ! {
    device::hid_writer_task(keyboard, device::report_receiver()).await
}

#[embassy_executor::task]
async fn msc_task(
    storage: MscClass<'static, UsbDriver>,
    disk: &'static DiskLock<CriticalSectionRawMutex, DiskFlash>,
) -> ! {
    storage.run(disk).await
}

/// Read both stick axes. A failed conversion reads as centred.
fn read_stick(
    adc: &mut Adc<'static, AdcBlocking>,
    x: &mut AdcChannel<'static>,
    y: &mut AdcChannel<'static>,
) -> StickSample {
    StickSample {
        x: adc.blocking_read(x).unwrap_or(StickSample::CENTER.x),
        y: adc.blocking_read(y).unwrap_or(StickSample::CENTER.y),
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    {
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        // SAFETY: runs once, before any allocation.
        unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
    }

    info!("macropad starting");
    let p = embassy_rp::init(Default::default());

    // Virtual disk
    let flash: DiskFlash = Flash::new_blocking(p.FLASH);
    let mut disk = unwrap!(VirtualDisk::new(flash, DISK_FLASH_OFFSET));
    match unwrap!(disk.mount()) {
        Mount::Restored => info!("disk image restored from flash"),
        Mount::Formatted => info!("no valid disk image, formatted a new one"),
    }
    let disk: &'static DiskLock<_, _> = DISK.init(Mutex::new(RefCell::new(disk)));

    // USB
    let usb = device::init(p.USB);
    unwrap!(spawner.spawn(usb_task(usb.device)));
    unwrap!(spawner.spawn(hid_task(usb.keyboard_writer)));
    unwrap!(spawner.spawn(msc_task(usb.storage, disk)));

    // Key matrix: rows GP6-8 driven, columns GP5,4,3 sampled.
    let rows = [
        Output::new(p.PIN_6, Level::Low),
        Output::new(p.PIN_7, Level::Low),
        Output::new(p.PIN_8, Level::Low),
    ];
    let cols = [
        Input::new(p.PIN_5, Pull::Down),
        Input::new(p.PIN_4, Pull::Down),
        Input::new(p.PIN_3, Pull::Down),
    ];
    let mut matrix = KeyMatrix::new(rows, cols, Delay);

    // Analog stick on ADC0 / ADC1.
    let mut adc = Adc::new_blocking(p.ADC, AdcConfig::default());
    let mut stick_x = AdcChannel::new_pin(p.PIN_26, Pull::None);
    let mut stick_y = AdcChannel::new_pin(p.PIN_27, Pull::None);

    // Display on I2C0: SDA GP16, SCL GP17.
    let i2c = I2c::new_blocking(p.I2C0, p.PIN_17, p.PIN_16, i2c::Config::default());
    let screen = OledScreen::new(i2c);

    let rest = read_stick(&mut adc, &mut stick_x, &mut stick_y);
    let mut controller = ModeController::new(
        screen,
        UsbKeyboard,
        UsbControl,
        disk,
        Instant::now().as_millis(),
        rest,
    );

    info!("control loop started");
    let mut ticker = Ticker::every(Duration::from_millis(MAIN_LOOP_PERIOD_MS));
    loop {
        let now = Instant::now().as_millis();

        if let Some((configured, suspended)) = device::take_link_change() {
            controller.usb_state_changed(configured, suspended, now);
        }

        if device::EJECTED.try_take().is_some() {
            if let Err(e) = controller.storage_ejected(now) {
                defmt::panic!("flushing the disk failed: {}", e);
            }
        }

        let snapshot = matrix.poll(now);
        let stick = read_stick(&mut adc, &mut stick_x, &mut stick_y);
        if let Err(e) = controller.update(now, &snapshot, stick) {
            defmt::panic!("control loop failed: {}", e);
        }

        ticker.next().await;
    }
}
