//! Physical inputs: the scanned key matrix and the analog stick.

pub mod matrix;
pub mod stick;

pub use matrix::{Debouncer, InputSnapshot, KeyMatrix};
pub use stick::{Gesture, GestureDetector, StickSample, Swing};
