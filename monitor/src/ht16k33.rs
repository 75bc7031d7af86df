//! HT16K33 4-digit 7-segment backpack over any embedded-hal I2C bus.

use anyhow::{anyhow, Context};
use embedded_hal::i2c::{Error as _, I2c};

use crate::ports::SegmentDisplay;

pub const HT16K33_ADDRESS: u8 = 0x70;
const OSCILLATOR_ON: u8 = 0x21;
const DISPLAY_ON: u8 = 0x81;
const BRIGHTNESS_BASE: u8 = 0xE0;

const RAM_LEN: usize = 16;
/// Byte offsets of the four digits; offset 4 drives the colon.
const DIGIT_OFFSETS: [usize; 4] = [0, 2, 6, 8];

const HEX_GLYPHS: [u8; 16] = [
    0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F, 0x5F, 0x7C, 0x58, 0x5E, 0x7B,
    0x71,
];
const MINUS_GLYPH: u8 = 0x40;
const BLANK_GLYPH: u8 = 0x00;

fn brightness_command(level: u8) -> u8 {
    BRIGHTNESS_BASE | level.min(15)
}

pub struct Ht16k33<I2C> {
    i2c: I2C,
    address: u8,
    ram: [u8; RAM_LEN],
}

impl<I2C: I2c> Ht16k33<I2C> {
    /// Starts the oscillator, enables the display and blanks it.
    pub fn new(i2c: I2C, address: u8, brightness: u8) -> anyhow::Result<Self> {
        let mut display = Self {
            i2c,
            address,
            ram: [0; RAM_LEN],
        };
        for command in [OSCILLATOR_ON, DISPLAY_ON, brightness_command(brightness)] {
            display
                .i2c
                .write(address, &[command])
                .map_err(|err| anyhow!("{:?}", err.kind()))
                .with_context(|| format!("display command {command:#04x} failed"))?;
        }
        display.draw()?;
        Ok(display)
    }

    fn set_glyph(&mut self, glyph: u8, digit: usize) -> anyhow::Result<()> {
        let offset = *DIGIT_OFFSETS
            .get(digit)
            .ok_or_else(|| anyhow!("digit position {digit} is out of range"))?;
        self.ram[offset] = glyph;
        Ok(())
    }
}

impl<I2C: I2c> SegmentDisplay for Ht16k33<I2C> {
    fn set_number(&mut self, value: u8, digit: usize) -> anyhow::Result<()> {
        let glyph = *HEX_GLYPHS
            .get(usize::from(value))
            .ok_or_else(|| anyhow!("number {value} has no single-digit glyph"))?;
        self.set_glyph(glyph, digit)
    }

    fn set_character(&mut self, ch: char, digit: usize) -> anyhow::Result<()> {
        let glyph = match ch {
            '-' => MINUS_GLYPH,
            ' ' => BLANK_GLYPH,
            _ => match ch.to_digit(16) {
                Some(value) => HEX_GLYPHS[value as usize],
                None => return Err(anyhow!("character {ch:?} has no glyph")),
            },
        };
        self.set_glyph(glyph, digit)
    }

    /// Rewrites the whole display RAM starting at address 0.
    fn draw(&mut self) -> anyhow::Result<()> {
        let mut frame = [0_u8; RAM_LEN + 1];
        frame[1..].copy_from_slice(&self.ram);
        self.i2c
            .write(self.address, &frame)
            .map_err(|err| anyhow!("{:?}", err.kind()))
            .context("display refresh failed")
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::render::show_readout;

    fn init(brightness: u8) -> Vec<I2cTransaction> {
        vec![
            I2cTransaction::write(HT16K33_ADDRESS, vec![OSCILLATOR_ON]),
            I2cTransaction::write(HT16K33_ADDRESS, vec![DISPLAY_ON]),
            I2cTransaction::write(HT16K33_ADDRESS, vec![brightness_command(brightness)]),
            I2cTransaction::write(HT16K33_ADDRESS, vec![0; RAM_LEN + 1]),
        ]
    }

    fn frame(digits: [u8; 4]) -> Vec<u8> {
        let mut frame = vec![0_u8; RAM_LEN + 1];
        for (glyph, offset) in digits.into_iter().zip(DIGIT_OFFSETS) {
            frame[offset + 1] = glyph;
        }
        frame
    }

    #[test]
    fn init_sequence_blanks_the_display() {
        let expectations = init(10);
        let mut bus = I2cMock::new(&expectations);
        let _display = Ht16k33::new(bus.clone(), HT16K33_ADDRESS, 10).unwrap();

        bus.done();
    }

    #[test]
    fn brightness_is_capped() {
        assert_eq!(brightness_command(10), 0xEA);
        assert_eq!(brightness_command(99), 0xEF);
    }

    #[test]
    fn readout_lands_on_digit_offsets() {
        let mut expectations = init(15);
        expectations.push(I2cTransaction::write(
            HT16K33_ADDRESS,
            frame([0x06, MINUS_GLYPH, 0x07, 0x5B]),
        ));
        let mut bus = I2cMock::new(&expectations);
        let mut display = Ht16k33::new(bus.clone(), HT16K33_ADDRESS, 15).unwrap();

        assert!(show_readout(&mut display, 1, 72.0));

        bus.done();
    }

    #[test]
    fn hex_nibbles_and_blanks_have_glyphs() {
        let mut expectations = init(0);
        expectations.push(I2cTransaction::write(
            HT16K33_ADDRESS,
            frame([0x71, BLANK_GLYPH, 0x7C, 0x3F]),
        ));
        let mut bus = I2cMock::new(&expectations);
        let mut display = Ht16k33::new(bus.clone(), HT16K33_ADDRESS, 0).unwrap();

        display.set_number(0xF, 0).unwrap();
        display.set_character(' ', 1).unwrap();
        display.set_character('b', 2).unwrap();
        display.set_number(0, 3).unwrap();
        display.draw().unwrap();

        bus.done();
    }

    #[test]
    fn rejects_unknown_positions_and_glyphs() {
        let expectations = init(10);
        let mut bus = I2cMock::new(&expectations);
        let mut display = Ht16k33::new(bus.clone(), HT16K33_ADDRESS, 10).unwrap();

        assert!(display.set_number(3, 4).is_err());
        assert!(display.set_number(16, 0).is_err());
        assert!(display.set_character('°', 0).is_err());
        assert_eq!(display.ram, [0; RAM_LEN]);

        bus.done();
    }

    #[test]
    fn nack_during_refresh_is_reported() {
        let mut expectations = init(10);
        expectations.push(
            I2cTransaction::write(HT16K33_ADDRESS, vec![0; RAM_LEN + 1])
                .with_error(ErrorKind::Other),
        );
        let mut bus = I2cMock::new(&expectations);
        let mut display = Ht16k33::new(bus.clone(), HT16K33_ADDRESS, 10).unwrap();

        let err = display.draw().unwrap_err();
        assert!(err.to_string().contains("display refresh failed"));

        bus.done();
    }
}
