//! USB composite device - boot keyboard + mass storage.
//!
//! Initialises the Embassy USB stack on the RP2040 USB peripheral and
//! exposes the keyboard writer, the storage class and the control handles
//! the mode controller drives.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, select3, Either, Either3};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_rp::bind_interrupts;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use embassy_usb::class::hid::{Config as HidConfig, HidWriter, State};
use embassy_usb::{Builder, Config, Handler, UsbDevice};
use static_cell::StaticCell;

use super::msc::{MscClass, MscControl};
use crate::config;
use crate::controller::{UsbFeatures, UsbPort};
use crate::hid::keyboard::{KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};
use crate::hid::{HidSink, KeyboardReport};

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

pub type UsbDriver = Driver<'static, USB>;

/// Time spent detached while switching personality (ms).
const REATTACH_DELAY_MS: u64 = 100;

static KB_STATE: StaticCell<State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static USB_STATE_HANDLER: StaticCell<UsbStateHandler> = StaticCell::new();
static MSC_CONTROL: StaticCell<MscControl> = StaticCell::new();

static CONFIGURED: AtomicBool = AtomicBool::new(false);
static SUSPENDED: AtomicBool = AtomicBool::new(false);
static LINK_CHANGED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

static HID_ENABLED: AtomicBool = AtomicBool::new(true);
static MSC_ENABLED: AtomicBool = AtomicBool::new(false);
static REATTACH: Signal<CriticalSectionRawMutex, ()> = Signal::new();
static REMOTE_WAKEUP: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Keyboard reports waiting for the HID endpoint.
static REPORTS: Channel<CriticalSectionRawMutex, KeyboardReport, 8> = Channel::new();

/// Raised by the storage task when the host ejects the drive.
pub static EJECTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

struct UsbStateHandler;

impl Handler for UsbStateHandler {
    fn configured(&mut self, configured: bool) {
        CONFIGURED.store(configured, Ordering::Release);
        LINK_CHANGED.signal(());
    }

    fn suspended(&mut self, suspended: bool) {
        SUSPENDED.store(suspended, Ordering::Release);
        LINK_CHANGED.signal(());
    }
}

/// Host link state as `(configured, suspended)` if it changed since the
/// last call.
pub fn take_link_change() -> Option<(bool, bool)> {
    LINK_CHANGED.try_take().map(|()| {
        (
            CONFIGURED.load(Ordering::Acquire),
            SUSPENDED.load(Ordering::Acquire),
        )
    })
}

/// `true` while the storage personality is active.
pub fn storage_enabled() -> bool {
    MSC_ENABLED.load(Ordering::Acquire)
}

/// Build result containing the USB device runner and its two classes.
pub struct UsbParts {
    pub device: UsbDevice<'static, UsbDriver>,
    pub keyboard_writer: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>,
    pub storage: MscClass<'static, UsbDriver>,
}

/// Initialise the USB stack and create the composite device.
///
/// Must be called exactly once. All static buffers are consumed here.
pub fn init(usb: USB) -> UsbParts {
    let driver = Driver::new(usb, Irqs);

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;
    usb_config.supports_remote_wakeup = true;

    // Composite with interface association descriptors, for Windows.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 128]),
    );

    builder.handler(USB_STATE_HANDLER.init(UsbStateHandler));

    let kb_config = HidConfig {
        report_descriptor: KEYBOARD_REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: config::USB_HID_POLL_MS,
        max_packet_size: 8,
    };
    let keyboard_writer = HidWriter::new(&mut builder, KB_STATE.init(State::new()), kb_config);

    let storage = MscClass::new(&mut builder, MSC_CONTROL.init(MscControl::new()));

    let device = builder.build();

    info!("USB composite device initialised (keyboard + storage)");

    UsbParts {
        device,
        keyboard_writer,
        storage,
    }
}

/// Run the USB device stack - must be spawned as a dedicated Embassy task.
///
/// Besides servicing the bus this performs remote wakeups and the
/// detach/attach cycle of a personality switch.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    info!("USB device task started");
    loop {
        match select(device.run_until_suspend(), REATTACH.wait()).await {
            Either::First(()) => {
                match select3(device.wait_resume(), REMOTE_WAKEUP.wait(), REATTACH.wait()).await {
                    Either3::First(()) => {}
                    Either3::Second(()) => {
                        if device.remote_wakeup().await.is_err() {
                            warn!("USB remote wakeup refused by host");
                        }
                    }
                    Either3::Third(()) => reattach(&mut device).await,
                }
            }
            Either::Second(()) => reattach(&mut device).await,
        }
    }
}

async fn reattach(device: &mut UsbDevice<'static, UsbDriver>) {
    info!("USB detaching for personality switch");
    device.disable().await;
    Timer::after_millis(REATTACH_DELAY_MS).await;
}

/// Keyboard report forwarding task - drains the report channel into the
/// HID endpoint.
pub async fn hid_writer_task(
    mut keyboard: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>,
    report_rx: Receiver<'static, CriticalSectionRawMutex, KeyboardReport, 8>,
) -> ! {
    info!("HID writer task started - waiting for reports");

    let mut buf = [0u8; KEYBOARD_REPORT_SIZE];

    loop {
        let report = report_rx.receive().await;
        let n = report.serialize(&mut buf);
        if let Err(_e) = keyboard.write(&buf[..n]).await {
            warn!("USB keyboard write failed");
        }
    }
}

pub fn report_receiver() -> Receiver<'static, CriticalSectionRawMutex, KeyboardReport, 8> {
    REPORTS.receiver()
}

/// [`HidSink`] feeding the report channel.
pub struct UsbKeyboard;

impl HidSink for UsbKeyboard {
    fn is_ready(&self) -> bool {
        HID_ENABLED.load(Ordering::Acquire)
            && CONFIGURED.load(Ordering::Acquire)
            && !SUSPENDED.load(Ordering::Acquire)
            && !REPORTS.is_full()
    }

    fn send_report(&mut self, report: &KeyboardReport) {
        if REPORTS.try_send(*report).is_err() {
            warn!("HID report dropped: channel full");
        }
    }
}

/// [`UsbPort`] backed by the static device controls.
pub struct UsbControl;

impl UsbPort for UsbControl {
    fn set_features(&mut self, features: UsbFeatures) {
        info!("USB features hid={} msc={}", features.hid, features.msc);
        HID_ENABLED.store(features.hid, Ordering::Release);
        MSC_ENABLED.store(features.msc, Ordering::Release);
        REATTACH.signal(());
    }

    fn remote_wakeup(&mut self) {
        REMOTE_WAKEUP.signal(());
    }

    fn reset_to_bootloader(&mut self) {
        info!("rebooting into the USB bootloader");
        embassy_rp::rom_data::reset_to_usb_boot(0, 0);
    }
}
