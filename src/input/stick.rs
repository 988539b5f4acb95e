//! Analog stick gesture detection.
//!
//! Raw ADC readings are scaled into display coordinates and the plane is cut
//! into thirds on each axis. A gesture fires when the stick moves into an
//! outer third from the middle, so a held deflection fires once.

use crate::config::ADC_FULL_SCALE;

/// Direction of a single-axis gesture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Swing {
    #[default]
    None,
    Negative,
    Positive,
}

/// Result of one detector update. At most one axis carries a swing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gesture {
    pub dx: Swing,
    pub dy: Swing,
}

impl Gesture {
    pub const NONE: Self = Self {
        dx: Swing::None,
        dy: Swing::None,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

/// One raw sample of both stick axes, in ADC counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StickSample {
    pub x: u16,
    pub y: u16,
}

impl StickSample {
    /// Centre of the ADC range on both axes.
    pub const CENTER: Self = Self {
        x: ADC_FULL_SCALE / 2,
        y: ADC_FULL_SCALE / 2,
    };
}

/// Scale a raw ADC reading into `0..span`.
fn normalize(raw: u16, span: u16) -> u16 {
    let divisor = (ADC_FULL_SCALE / span.max(1)).max(1);
    raw / divisor
}

/// Edge-triggered thirds detector.
#[derive(Clone, Copy, Debug)]
pub struct GestureDetector {
    width: u16,
    height: u16,
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
    prev_x: u16,
    prev_y: u16,
}

impl GestureDetector {
    /// Build a detector for a `width` × `height` coordinate space. The
    /// previous position starts at the centre.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            left: width / 3,
            right: width - width / 3,
            top: height / 3,
            bottom: height - height / 3,
            prev_x: width / 2,
            prev_y: height / 2,
        }
    }

    /// Record a sample as the previous position without evaluating it.
    /// Used at boot so a stick resting off-centre does not fire.
    pub fn prime(&mut self, sample: StickSample) {
        self.prev_x = normalize(sample.x, self.width);
        self.prev_y = normalize(sample.y, self.height);
    }

    /// Evaluate one sample against the previous one.
    pub fn update(&mut self, sample: StickSample) -> Gesture {
        let x = normalize(sample.x, self.width);
        let y = normalize(sample.y, self.height);

        let gesture = if x < self.left && self.prev_x >= self.left {
            Gesture {
                dx: Swing::Negative,
                dy: Swing::None,
            }
        } else if x > self.right && self.prev_x <= self.right {
            Gesture {
                dx: Swing::Positive,
                dy: Swing::None,
            }
        } else if y < self.top && self.prev_y >= self.top {
            Gesture {
                dx: Swing::None,
                dy: Swing::Negative,
            }
        } else if y > self.bottom && self.prev_y <= self.bottom {
            Gesture {
                dx: Swing::None,
                dy: Swing::Positive,
            }
        } else {
            Gesture::NONE
        };

        self.prev_x = x;
        self.prev_y = y;

        if !gesture.is_none() {
            debug!("stick: gesture dx={} dy={}", gesture.dx, gesture.dy);
        }
        gesture
    }
}
