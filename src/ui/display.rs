//! SSD1306 128×32 OLED behind the [`Screen`] seam.

use embedded_graphics::mono_font::ascii::FONT_5X8;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

use super::{Justify, Screen};
use crate::config::FONT_WIDTH;

/// Type alias for the concrete display driver.
///
/// Generic over the I²C implementation so callers pass in their HAL's
/// I²C peripheral.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x32, BufferedGraphicsMode<DisplaySize128x32>>;

/// Pre-charge period used with every contrast setting.
const PRECHARGE: u8 = 0x1;

pub struct OledScreen<I2C> {
    display: Display<I2C>,
    lit: bool,
}

impl<I2C> OledScreen<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    /// Initialise the panel, blank and switched off.
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x32, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        let _ = display.init();
        display.clear_buffer();
        let _ = display.flush();
        let _ = display.set_display_on(false);
        Self {
            display,
            lit: false,
        }
    }
}

fn color(on: bool) -> BinaryColor {
    if on {
        BinaryColor::On
    } else {
        BinaryColor::Off
    }
}

fn text_style(on: bool) -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_5X8)
        .text_color(color(on))
        .build()
}

impl<I2C> Screen for OledScreen<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    fn clear(&mut self) {
        self.display.clear_buffer();
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, max_width: u32, justify: Justify, on: bool) {
        let chars = (max_width / FONT_WIDTH as u32) as usize;
        let text = match text.char_indices().nth(chars) {
            Some((end, _)) => &text[..end],
            None => text,
        };

        let (anchor, alignment) = match justify {
            Justify::Left => (x, Alignment::Left),
            Justify::Center => (x + max_width as i32 / 2, Alignment::Center),
            Justify::Right => (x + max_width as i32 - 1, Alignment::Right),
        };
        let layout = TextStyleBuilder::new()
            .alignment(alignment)
            .baseline(Baseline::Top)
            .build();

        let _ = Text::with_text_style(text, Point::new(anchor, y), text_style(on), layout)
            .draw(&mut self.display);
    }

    fn draw_rect(&mut self, x: i32, y: i32, width: u32, height: u32, on: bool) {
        let _ = Rectangle::new(Point::new(x, y), Size::new(width, height))
            .into_styled(PrimitiveStyle::with_fill(color(on)))
            .draw(&mut self.display);
    }

    fn present(&mut self) {
        let _ = self.display.flush();
    }

    fn set_contrast(&mut self, level: u8) {
        if level == 0 {
            let _ = self.display.set_display_on(false);
            self.lit = false;
            return;
        }
        let _ = self.display.set_brightness(Brightness::custom(PRECHARGE, level));
        if !self.lit {
            let _ = self.display.set_display_on(true);
            self.lit = true;
        }
    }
}
