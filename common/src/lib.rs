pub mod config;
pub mod fan;
pub mod readout;
pub mod snapshot;
pub mod topics;
pub mod types;

pub use config::{ConfigError, DeviceConfig, LoopConfig};
pub use fan::{FanAction, FanRule, FAN_FULL_DUTY, FAN_OFF_DUTY};
pub use readout::{encode_readout, Cell, Readout, ReadoutError};
pub use snapshot::{DeviceSnapshot, MetricUpdate, ZoneReading};
pub use topics::*;
pub use types::{Metric, RawReading, Zone};
