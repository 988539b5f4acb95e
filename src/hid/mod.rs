//! HID report types and the outgoing report seam.

pub mod keyboard;
pub mod keycodes;

pub use keyboard::KeyboardReport;

/// Destination for keyboard reports (the USB HID interface on target).
pub trait HidSink {
    /// `true` when the transport can take a report right now. Reports
    /// offered while not ready are dropped, never queued.
    fn is_ready(&self) -> bool;

    /// Send a populated report.
    fn send_report(&mut self, report: &KeyboardReport);

    /// Send the all-keys-released report.
    fn send_release(&mut self) {
        self.send_report(&KeyboardReport::empty());
    }
}

impl<T: HidSink + ?Sized> HidSink for &mut T {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn send_report(&mut self, report: &KeyboardReport) {
        (**self).send_report(report)
    }

    fn send_release(&mut self) {
        (**self).send_release()
    }
}
