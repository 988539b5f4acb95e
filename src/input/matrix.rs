//! Row/column key matrix scanner with a two-observation confirm debounce.
//!
//! Each row is driven high in turn while the columns (pulled down) are
//! sampled. A cell that reads differently from its committed state is only
//! marked pending; the change is committed when the next scan agrees. Scans
//! are spaced at least [`MATRIX_SCAN_INTERVAL_MS`] apart so contact bounce
//! has settled between the two observations.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::config::{
    MATRIX_COLS, MATRIX_ROWS, MATRIX_ROW_RELEASE_US, MATRIX_ROW_SETTLE_US,
    MATRIX_SCAN_INTERVAL_MS,
};

/// Committed key state plus the cells that changed on this scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputSnapshot {
    pressed: u32,
    changed: u32,
}

impl InputSnapshot {
    /// Build a snapshot from raw bitmasks (bit = `row * MATRIX_COLS + col`).
    pub const fn from_masks(pressed: u32, changed: u32) -> Self {
        Self { pressed, changed }
    }

    /// Bit index of a cell.
    pub const fn index(row: usize, col: usize) -> usize {
        row * MATRIX_COLS + col
    }

    /// Level: the key is held.
    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        self.pressed & (1 << Self::index(row, col)) != 0
    }

    /// The key's committed state flipped on this scan.
    pub fn has_changed(&self, row: usize, col: usize) -> bool {
        self.changed & (1 << Self::index(row, col)) != 0
    }

    /// The key went down on this scan.
    pub fn pressed_edge(&self, row: usize, col: usize) -> bool {
        self.has_changed(row, col) && self.is_pressed(row, col)
    }

    pub fn any_changed(&self) -> bool {
        self.changed != 0
    }

    pub fn any_pressed(&self) -> bool {
        self.pressed != 0
    }

    pub fn pressed_mask(&self) -> u32 {
        self.pressed
    }

    pub fn changed_mask(&self) -> u32 {
        self.changed
    }
}

/// Per-cell two-observation confirm debounce.
#[derive(Clone, Copy, Debug, Default)]
pub struct Debouncer {
    state: u32,
    pending: u32,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self {
            state: 0,
            pending: 0,
        }
    }

    /// Feed one raw observation of a cell. Returns `true` when this
    /// observation committed a state change.
    pub fn observe(&mut self, index: usize, raw: bool) -> bool {
        let bit = 1u32 << index;
        let committed = self.state & bit != 0;

        if raw == committed {
            // Agreement cancels any half-seen flip.
            self.pending &= !bit;
            return false;
        }

        if self.pending & bit == 0 {
            self.pending |= bit;
            return false;
        }

        self.pending &= !bit;
        if raw {
            self.state |= bit;
        } else {
            self.state &= !bit;
        }
        true
    }

    /// Committed state bitmask.
    pub fn state(&self) -> u32 {
        self.state
    }
}

/// Scanned key matrix.
///
/// Rows are push-pull outputs, columns are inputs with pull-downs.
pub struct KeyMatrix<R, C, D> {
    rows: [R; MATRIX_ROWS],
    cols: [C; MATRIX_COLS],
    delay: D,
    debouncer: Debouncer,
    last_scan_ms: Option<u64>,
}

impl<R, C, D> KeyMatrix<R, C, D>
where
    R: OutputPin,
    C: InputPin,
    D: DelayNs,
{
    pub fn new(mut rows: [R; MATRIX_ROWS], cols: [C; MATRIX_COLS], delay: D) -> Self {
        for row in rows.iter_mut() {
            let _ = row.set_low();
        }
        Self {
            rows,
            cols,
            delay,
            debouncer: Debouncer::new(),
            last_scan_ms: None,
        }
    }

    /// Scan the matrix if the minimum spacing has elapsed.
    ///
    /// A rate-limited call returns the committed state with an empty change
    /// mask, so every committed edge is reported exactly once.
    pub fn poll(&mut self, now_ms: u64) -> InputSnapshot {
        if let Some(last) = self.last_scan_ms {
            if now_ms.saturating_sub(last) < MATRIX_SCAN_INTERVAL_MS {
                return InputSnapshot::from_masks(self.debouncer.state(), 0);
            }
        }
        self.last_scan_ms = Some(now_ms);

        let mut changed = 0u32;
        for (r, row) in self.rows.iter_mut().enumerate() {
            let _ = row.set_high();
            self.delay.delay_us(MATRIX_ROW_SETTLE_US);

            for (c, col) in self.cols.iter_mut().enumerate() {
                let index = InputSnapshot::index(r, c);
                let previous = self.debouncer.state() & (1 << index) != 0;
                // A failed read counts as "no change".
                let raw = col.is_high().unwrap_or(previous);
                if self.debouncer.observe(index, raw) {
                    changed |= 1 << index;
                }
            }

            let _ = row.set_low();
            self.delay.delay_us(MATRIX_ROW_RELEASE_US);
        }

        if changed != 0 {
            trace!("matrix: state={=u32:b} changed={=u32:b}", self.debouncer.state(), changed);
        }

        InputSnapshot::from_masks(self.debouncer.state(), changed)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::cell::Cell;
    use core::convert::Infallible;
    use std::rc::Rc;

    /// Wiring shared by fake pins: which row is driven and which cells are
    /// physically closed.
    #[derive(Default)]
    struct Wiring {
        driven_row: Cell<Option<usize>>,
        closed: Cell<u32>,
    }

    struct RowPin {
        row: usize,
        wiring: Rc<Wiring>,
    }

    struct ColPin {
        col: usize,
        wiring: Rc<Wiring>,
    }

    struct NoDelay;

    impl embedded_hal::digital::ErrorType for RowPin {
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

    impl embedded_hal::digital::ErrorType for ColPin {
        type Error = Infallible;
    }

    impl InputPin for ColPin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(match self.wiring.driven_row.get() {
                Some(row) => {
                    self.wiring.closed.get() & (1 << InputSnapshot::index(row, self.col)) != 0
                }
                None => false,
            })
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn matrix() -> (KeyMatrix<RowPin, ColPin, NoDelay>, Rc<Wiring>) {
        let wiring = Rc::new(Wiring::default());
        let rows = core::array::from_fn(|row| RowPin {
            row,
            wiring: wiring.clone(),
        });
        let cols = core::array::from_fn(|col| ColPin {
            col,
            wiring: wiring.clone(),
        });
        (KeyMatrix::new(rows, cols, NoDelay), wiring)
    }

    #[test]
    fn single_flip_is_not_committed() {
        let mut deb = Debouncer::new();
        assert!(!deb.observe(0, true));
        assert!(!deb.observe(0, false));
        assert!(!deb.observe(0, false));
        assert_eq!(deb.state(), 0);
    }

    #[test]
    fn two_agreeing_observations_commit() {
        let mut deb = Debouncer::new();
        assert!(!deb.observe(3, true));
        assert!(deb.observe(3, true));
        assert_eq!(deb.state(), 1 << 3);

        assert!(!deb.observe(3, false));
        assert!(deb.observe(3, false));
        assert_eq!(deb.state(), 0);
    }

    #[test]
    fn press_commits_on_second_spaced_scan() {
        let (mut m, wiring) = matrix();
        wiring.closed.set(1 << InputSnapshot::index(1, 2));

        let first = m.poll(0);
        assert!(!first.is_pressed(1, 2));
        assert!(!first.any_changed());

        let second = m.poll(10);
        assert!(second.is_pressed(1, 2));
        assert!(second.pressed_edge(1, 2));
        assert_eq!(second.changed_mask(), 1 << 5);
    }

    #[test]
    fn scans_closer_than_interval_are_skipped() {
        let (mut m, wiring) = matrix();
        wiring.closed.set(1);

        m.poll(0);
        // Too soon: no second observation, nothing committed.
        let early = m.poll(5);
        assert!(!early.is_pressed(0, 0));

        let late = m.poll(10);
        assert!(late.is_pressed(0, 0));
        assert!(late.has_changed(0, 0));

        // The edge is reported once; rate-limited polls keep the level only.
        let repeat = m.poll(12);
        assert!(repeat.is_pressed(0, 0));
        assert!(!repeat.any_changed());
    }

    #[test]
    fn isolated_bounce_is_rejected() {
        let (mut m, wiring) = matrix();
        wiring.closed.set(1 << 4);
        m.poll(0);
        wiring.closed.set(0);
        let snap = m.poll(10);
        assert!(!snap.any_pressed());
        assert!(!snap.any_changed());
        let snap = m.poll(20);
        assert!(!snap.any_pressed());
    }

    #[test]
    fn release_is_debounced_too() {
        let (mut m, wiring) = matrix();
        wiring.closed.set(1 << 8);
        m.poll(0);
        assert!(m.poll(10).is_pressed(2, 2));

        wiring.closed.set(0);
        assert!(m.poll(20).is_pressed(2, 2));
        let released = m.poll(30);
        assert!(!released.is_pressed(2, 2));
        assert!(released.has_changed(2, 2));
        assert!(!released.pressed_edge(2, 2));
    }
}
