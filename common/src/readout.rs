use thiserror::Error;

pub const SEPARATOR_GLYPH: char = '-';
pub const READOUT_DIGITS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Number(u8),
    Character(char),
}

/// Four display cells: index, separator, then two value nibbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readout {
    pub cells: [Cell; READOUT_DIGITS],
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ReadoutError {
    #[error("cannot show non-finite value {0}")]
    NonFinite(f32),
}

/// Builds the `index-VV` readout for `value`.
///
/// The truncated value is written in decimal and those digits are read back
/// as hexadecimal, so 72 becomes 0x72 and shows as `7`, `2`. Only the low
/// byte survives: values of 100 and above lose their leading digits and
/// negative values show their two's complement nibbles.
pub fn encode_readout(index: u8, value: f32) -> Result<Readout, ReadoutError> {
    if !value.is_finite() {
        return Err(ReadoutError::NonFinite(value));
    }

    let packed = decimal_digits_as_hex(value.trunc() as i64);
    let high = ((packed & 0xF0) >> 4) as u8;
    let low = (packed & 0x0F) as u8;

    Ok(Readout {
        cells: [
            Cell::Number(index),
            Cell::Character(SEPARATOR_GLYPH),
            Cell::Number(high),
            Cell::Number(low),
        ],
    })
}

fn decimal_digits_as_hex(whole: i64) -> i64 {
    // Wrapping keeps the low bits exact for arbitrarily long digit strings.
    let magnitude = whole
        .unsigned_abs()
        .to_string()
        .bytes()
        .fold(0_i64, |acc, digit| {
            acc.wrapping_mul(16).wrapping_add(i64::from(digit - b'0'))
        });
    if whole < 0 {
        magnitude.wrapping_neg()
    } else {
        magnitude
    }
}
