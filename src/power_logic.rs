//! Screen power policy: brightness, inactivity timeout, host connection.
//!
//! Pure state; the controller applies the decisions to the panel.

use crate::config::{
    BRIGHTNESS_DEFAULT, BRIGHTNESS_MAX, BRIGHTNESS_MIN, BRIGHTNESS_STEP,
    SCREEN_TIMEOUT_CONNECTED_MS, SCREEN_TIMEOUT_DISCONNECTED_MS,
};

/// Decide whether the screen should be lit after `idle_ms` without input.
pub fn screen_should_be_on(idle_ms: u64, timeout_ms: u64) -> bool {
    idle_ms <= timeout_ms
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScreenPolicy {
    brightness: u8,
    last_input_ms: u64,
    is_on: bool,
    timeout_ms: u64,
    usb_connected: bool,
}

impl ScreenPolicy {
    /// Screen off, host not connected, input clock started at `now_ms`.
    pub const fn new(now_ms: u64) -> Self {
        Self {
            brightness: BRIGHTNESS_DEFAULT,
            last_input_ms: now_ms,
            is_on: false,
            timeout_ms: SCREEN_TIMEOUT_DISCONNECTED_MS,
            usb_connected: false,
        }
    }

    /// Record user input.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_input_ms = now_ms;
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_input_ms)
    }

    pub fn should_be_on(&self, now_ms: u64) -> bool {
        screen_should_be_on(self.idle_ms(now_ms), self.timeout_ms)
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn set_on(&mut self, on: bool) {
        self.is_on = on;
    }

    /// Contrast the panel should have right now.
    pub fn contrast(&self) -> u8 {
        if self.is_on {
            self.brightness
        } else {
            0
        }
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn brightness_up(&mut self) -> u8 {
        self.brightness = self
            .brightness
            .saturating_add(BRIGHTNESS_STEP)
            .min(BRIGHTNESS_MAX);
        self.brightness
    }

    pub fn brightness_down(&mut self) -> u8 {
        self.brightness = self
            .brightness
            .saturating_sub(BRIGHTNESS_STEP)
            .max(BRIGHTNESS_MIN);
        self.brightness
    }

    pub fn usb_connected(&self) -> bool {
        self.usb_connected
    }

    /// Switch the timeout between the attached and detached values.
    pub fn set_usb_connected(&mut self, connected: bool) {
        self.usb_connected = connected;
        self.timeout_ms = if connected {
            SCREEN_TIMEOUT_CONNECTED_MS
        } else {
            SCREEN_TIMEOUT_DISCONNECTED_MS
        };
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_follows_connection() {
        let mut policy = ScreenPolicy::new(0);
        assert_eq!(policy.timeout_ms(), SCREEN_TIMEOUT_DISCONNECTED_MS);
        assert!(policy.should_be_on(SCREEN_TIMEOUT_DISCONNECTED_MS));
        assert!(!policy.should_be_on(SCREEN_TIMEOUT_DISCONNECTED_MS + 1));

        policy.set_usb_connected(true);
        assert!(policy.should_be_on(SCREEN_TIMEOUT_DISCONNECTED_MS + 1));
        assert!(!policy.should_be_on(SCREEN_TIMEOUT_CONNECTED_MS + 1));
    }

    #[test]
    fn input_restarts_the_timeout() {
        let mut policy = ScreenPolicy::new(0);
        policy.touch(50_000);
        assert_eq!(policy.idle_ms(50_500), 500);
        assert!(policy.should_be_on(55_000));
        // Clock going backwards never counts as idle time.
        assert_eq!(policy.idle_ms(10), 0);
    }

    #[test]
    fn brightness_is_clamped() {
        let mut policy = ScreenPolicy::new(0);
        assert_eq!(policy.brightness(), BRIGHTNESS_DEFAULT);
        assert_eq!(policy.brightness_down(), BRIGHTNESS_MIN);
        assert_eq!(policy.brightness_up(), 10);
        for _ in 0..100 {
            policy.brightness_up();
        }
        assert_eq!(policy.brightness(), BRIGHTNESS_MAX);
    }

    #[test]
    fn contrast_is_zero_while_off() {
        let mut policy = ScreenPolicy::new(0);
        assert_eq!(policy.contrast(), 0);
        policy.set_on(true);
        assert_eq!(policy.contrast(), BRIGHTNESS_DEFAULT);
    }
}
