//! Macro resolution and keyboard report emission.
//!
//! Each tick runs two passes over the active layer:
//!
//! 1. **Modifier state.** Every `Modifier` cell of the base grid is visited
//!    in scan order. Toggle cells flip the state on a press edge, momentary
//!    cells copy their pressed level. The last such cell wins.
//! 2. **Resolution.** Each held cell picks its macro from the overlay grid
//!    while the modifier state is set, else from the base grid. Keys go into
//!    a boot report. A key keeps its slot until released; once six slots are
//!    taken further keys are ignored. Actions are collected for the caller
//!    on their press edge.
//!
//! Reports go out only when their content changes: the first populated
//! report, any change while keys are held, and exactly one empty report when
//! the last key is released.

use heapless::Vec;

use crate::config::{KEY_COUNT, MATRIX_COLS};
use crate::hid::keyboard::MAX_KEYCODES;
use crate::hid::KeyboardReport;
use crate::input::InputSnapshot;
use crate::keymap::{Action, Grid, Layer, Macro};

/// What a tick asks the caller to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickOutput {
    /// Report to hand to the HID transport, if one is due.
    pub report: Option<KeyboardReport>,
    /// Actions triggered this tick, in scan order.
    pub actions: Vec<Action, KEY_COUNT>,
}

/// Modifier state and emission bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct MacroEngine {
    modifier_active: bool,
    /// Cells holding a report slot, one bit per cell.
    admitted: u32,
    /// Last report the host accepted; `None` once it has seen a release.
    last_sent: Option<KeyboardReport>,
}

impl MacroEngine {
    pub const fn new() -> Self {
        Self {
            modifier_active: false,
            admitted: 0,
            last_sent: None,
        }
    }

    pub fn modifier_active(&self) -> bool {
        self.modifier_active
    }

    /// Drop the modifier state (layer or keymap navigation).
    pub fn clear_modifier(&mut self) {
        self.modifier_active = false;
    }

    /// Forget everything, e.g. after the keymaps were reloaded.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Run one tick against `layer`. When `hid_ready` is false no report is
    /// produced and the emission state is left untouched, so the pending
    /// change goes out on the next ready tick.
    pub fn tick(&mut self, snapshot: &InputSnapshot, layer: &Layer, hid_ready: bool) -> TickOutput {
        self.resolve_modifier(snapshot, layer);

        let grid = layer.grid(self.modifier_active);
        let mut held = 0u32;
        let mut actions = Vec::new();

        for (index, macro_) in grid.iter().enumerate() {
            let (row, col) = (index / MATRIX_COLS, index % MATRIX_COLS);
            if !snapshot.is_pressed(row, col) {
                continue;
            }

            match macro_ {
                Macro::HidKey {
                    modifier, keycode, ..
                } if *modifier != 0 || *keycode != 0 => held |= 1 << index,
                Macro::Action(action) => {
                    if snapshot.pressed_edge(row, col) {
                        debug!("engine: action {}", action);
                        // One slot per cell, cannot overflow.
                        let _ = actions.push(*action);
                    }
                }
                _ => {}
            }
        }

        self.admit(held);
        let report = self.build_report(grid);

        TickOutput {
            report: if hid_ready {
                self.emit(self.admitted != 0, report)
            } else {
                None
            },
            actions,
        }
    }

    /// Cells that already own a report slot keep it; free slots go to newly
    /// held cells in scan order.
    fn admit(&mut self, held: u32) {
        let mut admitted = self.admitted & held;
        for index in 0..KEY_COUNT {
            let bit = 1 << index;
            if held & bit != 0
                && admitted & bit == 0
                && (admitted.count_ones() as usize) < MAX_KEYCODES
            {
                admitted |= bit;
            }
        }
        self.admitted = admitted;
    }

    fn build_report(&self, grid: &Grid) -> KeyboardReport {
        let mut report = KeyboardReport::empty();
        for (index, macro_) in grid.iter().enumerate() {
            if self.admitted & (1 << index) == 0 {
                continue;
            }
            if let Macro::HidKey {
                modifier, keycode, ..
            } = macro_
            {
                report.modifier |= modifier;
                if *keycode != 0 {
                    report.push_key(*keycode);
                }
            }
        }
        report
    }

    fn resolve_modifier(&mut self, snapshot: &InputSnapshot, layer: &Layer) {
        for (index, macro_) in layer.base.iter().enumerate() {
            let Macro::Modifier { persistent } = macro_ else {
                continue;
            };
            let (row, col) = (index / MATRIX_COLS, index % MATRIX_COLS);
            if *persistent {
                if snapshot.pressed_edge(row, col) {
                    self.modifier_active = !self.modifier_active;
                }
            } else {
                self.modifier_active = snapshot.is_pressed(row, col);
            }
        }
    }

    fn emit(&mut self, any_key: bool, report: KeyboardReport) -> Option<KeyboardReport> {
        if any_key {
            if self.last_sent == Some(report) {
                return None;
            }
            self.last_sent = Some(report);
            Some(report)
        } else {
            self.last_sent.take().map(|_| KeyboardReport::empty())
        }
    }
}
