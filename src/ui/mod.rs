//! User interface: the drawing seam and the screens drawn on it.
//!
//! ## Components
//!
//! - **Screen**: minimal drawing surface the controller renders onto
//! - **Render**: key legend grid, configuration screen, flash notice
//! - **Display**: SSD1306 128×32 OLED implementation (embedded builds only)

#[cfg(feature = "embedded")]
pub mod display;
pub mod render;

/// Horizontal placement of text inside its box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Justify {
    #[default]
    Left,
    Center,
    Right,
}

/// Pixel drawing surface with a back buffer.
///
/// Nothing is visible until [`present`](Screen::present). Coordinates are
/// pixels from the top-left corner; `on` selects the lit colour.
pub trait Screen {
    /// Clear the back buffer.
    fn clear(&mut self);

    /// Draw one line of text inside a box starting at `x` that is
    /// `max_width` pixels wide. `y` is the top of the glyph cell.
    fn draw_text(&mut self, text: &str, x: i32, y: i32, max_width: u32, justify: Justify, on: bool);

    /// Fill a rectangle.
    fn draw_rect(&mut self, x: i32, y: i32, width: u32, height: u32, on: bool);

    /// Push the back buffer to the panel.
    fn present(&mut self);

    /// Panel contrast; 0 blanks the panel.
    fn set_contrast(&mut self, level: u8);
}

impl<T: Screen + ?Sized> Screen for &mut T {
    fn clear(&mut self) {
        (**self).clear()
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, max_width: u32, justify: Justify, on: bool) {
        (**self).draw_text(text, x, y, max_width, justify, on)
    }

    fn draw_rect(&mut self, x: i32, y: i32, width: u32, height: u32, on: bool) {
        (**self).draw_rect(x, y, width, height, on)
    }

    fn present(&mut self) {
        (**self).present()
    }

    fn set_contrast(&mut self, level: u8) {
        (**self).set_contrast(level)
    }
}
