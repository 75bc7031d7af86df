use serde::{Deserialize, Serialize};

use crate::{snapshot::DeviceSnapshot, types::Zone};

pub const FAN_FULL_DUTY: u16 = u16::MAX;
pub const FAN_OFF_DUTY: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanAction {
    TurnOn,
    TurnOff,
}

impl FanAction {
    pub fn is_on(self) -> bool {
        matches!(self, Self::TurnOn)
    }

    pub fn duty(self) -> u16 {
        match self {
            Self::TurnOn => FAN_FULL_DUTY,
            Self::TurnOff => FAN_OFF_DUTY,
        }
    }

    pub fn payload(self) -> &'static str {
        match self {
            Self::TurnOn => "1",
            Self::TurnOff => "0",
        }
    }
}

/// Runs the fan while `hot_zone` is strictly warmer than `reference_zone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanRule {
    pub hot_zone: Zone,
    pub reference_zone: Zone,
}

impl Default for FanRule {
    fn default() -> Self {
        Self {
            hot_zone: Zone::Repeater,
            reference_zone: Zone::Outside,
        }
    }
}

impl FanRule {
    pub fn wants_fan(&self, snapshot: &DeviceSnapshot) -> bool {
        let hot = snapshot.zone(self.hot_zone).temperature_f;
        hot > snapshot.zone(self.reference_zone).temperature_f
    }

    /// Returns an action only when the desired state differs from the
    /// stored one. Uses whatever the snapshot holds; no sensor is read here.
    pub fn evaluate(&self, snapshot: &DeviceSnapshot) -> Option<FanAction> {
        let wanted = self.wants_fan(snapshot);
        if wanted == snapshot.fan_on() {
            return None;
        }
        Some(if wanted {
            FanAction::TurnOn
        } else {
            FanAction::TurnOff
        })
    }
}
