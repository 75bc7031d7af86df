//! Capabilities the control loop needs from the device. Host and ESP32
//! backends provide their own implementations; tests use in-memory fakes.

use repeater_common::RawReading;

/// One temperature/humidity sensor.
#[allow(async_fn_in_trait)]
pub trait ClimateSensor {
    async fn read(&mut self) -> anyhow::Result<RawReading>;
}

/// Fan PWM output. `duty` is scaled to the full `u16` range.
pub trait FanDriver {
    fn set_duty(&mut self, duty: u16) -> anyhow::Result<()>;
}

/// Broker connection.
#[allow(async_fn_in_trait)]
pub trait Publisher {
    async fn publish(&mut self, topic: &str, payload: &str) -> anyhow::Result<()>;
}

/// 4-digit numeric display. Cell writes are buffered until `draw`.
pub trait SegmentDisplay {
    fn set_number(&mut self, value: u8, digit: usize) -> anyhow::Result<()>;
    fn set_character(&mut self, ch: char, digit: usize) -> anyhow::Result<()>;
    fn draw(&mut self) -> anyhow::Result<()>;
}

pub trait LivenessIndicator {
    fn toggle(&mut self) -> anyhow::Result<()>;
}

/// Hard restart of the whole device or process. Production implementations
/// do not return.
pub trait DeviceReset {
    fn reset(&mut self);
}
