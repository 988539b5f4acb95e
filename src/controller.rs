//! Top-level state machine of the keypad.
//!
//! ```text
//!            Action::EnterConfig
//!   Keypad ──────────────────────▶ Configuring
//!     ▲        (USB → storage)          │
//!     │                                 │ storage ejected
//!     └─────────────────────────────────┘ (flush, reload, USB → keyboard)
//! ```
//!
//! Within `Keypad`, key macros are only resolved while the screen is on and
//! the settle gate is open. Waking the screen closes the gate until the
//! matrix has been quiet for [`INPUT_SETTLE_MS`], so the press that woke the
//! device never types.

use crate::config::{DISPLAY_HEIGHT, DISPLAY_WIDTH, INPUT_SETTLE_MS};
use crate::disk::ConfigStore;
use crate::engine::MacroEngine;
use crate::error::Error;
use crate::hid::HidSink;
use crate::input::{Gesture, GestureDetector, InputSnapshot, StickSample, Swing};
use crate::keymap::{loader, Action, KeymapCollection};
use crate::power_logic::ScreenPolicy;
use crate::ui::{render, Screen};

/// Which USB interfaces should be live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsbFeatures {
    pub hid: bool,
    pub msc: bool,
}

impl UsbFeatures {
    pub const KEYBOARD: Self = Self {
        hid: true,
        msc: false,
    };
    pub const STORAGE: Self = Self {
        hid: false,
        msc: true,
    };
}

/// USB device control used by the controller.
pub trait UsbPort {
    /// Switch personality. Implementations detach and re-attach so the host
    /// enumerates the new interface set.
    fn set_features(&mut self, features: UsbFeatures);

    /// Ask a suspended host to resume.
    fn remote_wakeup(&mut self);

    /// Reboot into the USB bootloader. Does not return on hardware.
    fn reset_to_bootloader(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Keypad,
    Configuring,
}

/// Owns every piece of runtime state and drives the collaborators.
pub struct ModeController<D, H, U, S> {
    screen: D,
    hid: H,
    usb: U,
    store: S,

    mode: Mode,
    keymaps: KeymapCollection,
    engine: MacroEngine,
    stick: GestureDetector,
    policy: ScreenPolicy,

    /// Settle gate: macros are resolved only while set.
    process_input: bool,
    needs_redraw: bool,
    usb_suspended: bool,
    /// A bootloader reset was requested; nothing runs after it.
    halted: bool,
}

impl<D, H, U, S> ModeController<D, H, U, S>
where
    D: Screen,
    H: HidSink,
    U: UsbPort,
    S: ConfigStore,
{
    /// Load the configuration and take the stick's resting position.
    pub fn new(screen: D, hid: H, usb: U, mut store: S, now_ms: u64, stick: StickSample) -> Self {
        let keymaps = loader::load_document(store.read_config().as_deref());
        let mut detector = GestureDetector::new(DISPLAY_WIDTH, DISPLAY_HEIGHT);
        detector.prime(stick);

        Self {
            screen,
            hid,
            usb,
            store,
            mode: Mode::Keypad,
            keymaps,
            engine: MacroEngine::new(),
            stick: detector,
            policy: ScreenPolicy::new(now_ms),
            process_input: false,
            needs_redraw: true,
            usb_suspended: false,
            halted: false,
        }
    }

    /// One pass of the control loop.
    pub fn update(
        &mut self,
        now_ms: u64,
        snapshot: &InputSnapshot,
        stick: StickSample,
    ) -> Result<(), Error> {
        if self.halted {
            return Ok(());
        }

        if self.accepts_input() {
            self.process_keys(snapshot)?;
            if self.halted {
                return Ok(());
            }
        }

        let gesture = self.stick.update(stick);
        if !gesture.is_none() {
            if self.accepts_input() {
                self.navigate(gesture);
            }
            self.engine.clear_modifier();
        }

        if !gesture.is_none() || snapshot.any_changed() {
            if self.usb_suspended {
                self.usb.remote_wakeup();
            }
            self.policy.touch(now_ms);
            self.needs_redraw = true;
        }

        if !self.process_input
            && self.policy.is_on()
            && self.policy.idle_ms(now_ms) >= INPUT_SETTLE_MS
        {
            debug!("controller: input settled");
            self.process_input = true;
        }

        if self.needs_redraw {
            self.needs_redraw = false;
            self.redraw(snapshot);
        }

        self.set_display_on(self.policy.should_be_on(now_ms));
        Ok(())
    }

    /// The host ejected the configuration drive: persist it and, when in
    /// configuration mode, reload the keymaps and return to the keyboard.
    pub fn storage_ejected(&mut self, now_ms: u64) -> Result<(), Error> {
        info!("controller: storage ejected");
        self.store.flush()?;

        if self.mode == Mode::Configuring {
            self.reload();
            self.mode = Mode::Keypad;
            self.usb.set_features(UsbFeatures::KEYBOARD);
            self.policy.touch(now_ms);
            self.needs_redraw = true;
            info!("controller: mode -> Keypad");
        }
        Ok(())
    }

    /// Host link changed. The link counts as connected when configured and
    /// not suspended.
    pub fn usb_state_changed(&mut self, configured: bool, suspended: bool, now_ms: u64) {
        self.usb_suspended = suspended;
        let connected = configured && !suspended;
        if connected == self.policy.usb_connected() {
            return;
        }

        info!("controller: usb connected={}", connected);
        if connected {
            self.policy.touch(now_ms);
        }
        self.policy.set_usb_connected(connected);
    }

    /// Rebuild the keymap collection from the disk and swap it in.
    pub fn reload(&mut self) {
        let keymaps = loader::load_document(self.store.read_config().as_deref());
        self.keymaps = keymaps;
        self.engine.reset();
        self.needs_redraw = true;
    }

    fn accepts_input(&self) -> bool {
        self.mode == Mode::Keypad && self.process_input
    }

    fn process_keys(&mut self, snapshot: &InputSnapshot) -> Result<(), Error> {
        let layer = self.keymaps.active().active_layer();
        let out = self.engine.tick(snapshot, layer, self.hid.is_ready());

        if let Some(report) = out.report {
            if report.is_empty() {
                self.hid.send_release();
            } else {
                self.hid.send_report(&report);
            }
        }

        for action in out.actions {
            self.execute(action)?;
            if self.halted || self.mode != Mode::Keypad {
                break;
            }
        }
        Ok(())
    }

    fn execute(&mut self, action: Action) -> Result<(), Error> {
        info!("controller: action {}", action);
        match action {
            Action::EnterConfig => {
                self.mode = Mode::Configuring;
                self.engine.reset();
                self.usb.set_features(UsbFeatures::STORAGE);
                self.needs_redraw = true;
                info!("controller: mode -> Configuring");
            }
            Action::Flash => {
                render::draw_flash_notice(&mut self.screen);
                self.store.flush()?;
                self.halted = true;
                self.usb.reset_to_bootloader();
            }
            Action::BrightnessUp => {
                self.policy.brightness_up();
                self.screen.set_contrast(self.policy.contrast());
            }
            Action::BrightnessDown => {
                self.policy.brightness_down();
                self.screen.set_contrast(self.policy.contrast());
            }
        }
        Ok(())
    }

    fn navigate(&mut self, gesture: Gesture) {
        match (gesture.dx, gesture.dy) {
            (Swing::Negative, _) => self.keymaps.active_mut().cycle_layer(false),
            (Swing::Positive, _) => self.keymaps.active_mut().cycle_layer(true),
            (_, Swing::Negative) => self.keymaps.cycle(false),
            (_, Swing::Positive) => self.keymaps.cycle(true),
            (Swing::None, Swing::None) => {}
        }
    }

    fn redraw(&mut self, snapshot: &InputSnapshot) {
        match self.mode {
            Mode::Keypad => render::draw_keymap(
                &mut self.screen,
                self.keymaps.active(),
                self.engine.modifier_active(),
                snapshot,
            ),
            Mode::Configuring => render::draw_config_screen(&mut self.screen),
        }
    }

    fn set_display_on(&mut self, on: bool) {
        if on == self.policy.is_on() {
            return;
        }
        if !on {
            self.process_input = false;
        }
        debug!("controller: screen on={}", on);
        self.policy.set_on(on);
        self.screen.set_contrast(self.policy.contrast());
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn keymaps(&self) -> &KeymapCollection {
        &self.keymaps
    }

    pub fn policy(&self) -> &ScreenPolicy {
        &self.policy
    }

    pub fn modifier_active(&self) -> bool {
        self.engine.modifier_active()
    }

    /// Settle gate state.
    pub fn is_processing_input(&self) -> bool {
        self.process_input
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn screen(&self) -> &D {
        &self.screen
    }

    pub fn hid(&self) -> &H {
        &self.hid
    }

    pub fn usb(&self) -> &U {
        &self.usb
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
