use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Zone {
    Inside,
    Outside,
    Repeater,
}

impl Zone {
    /// Reporting and rendering order.
    pub const ALL: [Zone; 3] = [Self::Inside, Self::Outside, Self::Repeater];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inside => "INSIDE",
            Self::Outside => "OUTSIDE",
            Self::Repeater => "REPEATER",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Inside => 0,
            Self::Outside => 1,
            Self::Repeater => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    Temperature,
    Humidity,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Self::Temperature, Self::Humidity];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "TEMPERATURE",
            Self::Humidity => "HUMIDITY",
        }
    }
}

/// A measurement as the sensor reports it, before unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub temperature_c: f32,
    pub humidity: f32,
}

impl RawReading {
    pub fn temperature_f(&self) -> f32 {
        celsius_to_fahrenheit(self.temperature_c)
    }
}

pub fn celsius_to_fahrenheit(temp_c: f32) -> f32 {
    temp_c * 9.0 / 5.0 + 32.0
}
