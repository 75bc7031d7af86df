use repeater_common::{encode_readout, Cell, Readout};
use tracing::debug;

use crate::ports::SegmentDisplay;

pub fn render_readout<D: SegmentDisplay>(display: &mut D, readout: &Readout) -> anyhow::Result<()> {
    for (digit, cell) in readout.cells.iter().enumerate() {
        match *cell {
            Cell::Number(value) => display.set_number(value, digit)?,
            Cell::Character(ch) => display.set_character(ch, digit)?,
        }
    }
    display.draw()
}

/// Shows `value` under `index`. Display faults are logged and dropped: a
/// broken display never takes the device down. Returns whether the frame
/// was drawn.
pub fn show_readout<D: SegmentDisplay>(display: &mut D, index: u8, value: f32) -> bool {
    let drawn = encode_readout(index, value)
        .map_err(anyhow::Error::from)
        .and_then(|readout| render_readout(display, &readout));

    match drawn {
        Ok(()) => true,
        Err(err) => {
            debug!("display frame {index} skipped: {err:#}");
            false
        }
    }
}
