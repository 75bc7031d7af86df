
use crate::{
    topics::metric_topic,
    types::{Metric, Zone},
};

pub const DEFAULT_HYSTERESIS: f32 = 1.0;

/// Last published values for one zone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneReading {
    pub temperature_f: f32,
    pub humidity: f32,
}

impl ZoneReading {
    pub fn new(temperature_f: f32, humidity: f32) -> Self {
        Self {
            temperature_f,
            humidity,
        }
    }

    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Temperature => self.temperature_f,
            Metric::Humidity => self.humidity,
        }
    }

    fn slot_mut(&mut self, metric: Metric) -> &mut f32 {
        match metric {
            Metric::Temperature => &mut self.temperature_f,
            Metric::Humidity => &mut self.humidity,
        }
    }
}

/// A stored value that moved far enough to be published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricUpdate {
    pub zone: Zone,
    pub metric: Metric,
    pub value: f32,
}

impl MetricUpdate {
    pub fn topic(&self) -> String {
        metric_topic(self.metric, self.zone)
    }

    /// Whole units, truncated toward zero.
    pub fn payload(&self) -> String {
        (self.value as i64).to_string()
    }
}

/// Everything the device knows between two restarts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    zones: [ZoneReading; 3],
    fan_on: bool,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(mut self, zone: Zone, reading: ZoneReading) -> Self {
        self.zones[zone.index()] = reading;
        self
    }

    pub fn zone(&self, zone: Zone) -> ZoneReading {
        self.zones[zone.index()]
    }

    pub fn fan_on(&self) -> bool {
        self.fan_on
    }

    pub fn set_fan_on(&mut self, on: bool) {
        self.fan_on = on;
    }

    /// Replaces the stored value when `value` differs from it by at least
    /// `threshold`. Smaller moves leave the snapshot untouched.
    pub fn apply(
        &mut self,
        zone: Zone,
        metric: Metric,
        value: f32,
        threshold: f32,
    ) -> Option<MetricUpdate> {
        let slot = self.zones[zone.index()].slot_mut(metric);
        if (*slot - value).abs() >= threshold {
            *slot = value;
            Some(MetricUpdate {
                zone,
                metric,
                value,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn seeded(temperature_f: f32, humidity: f32) -> DeviceSnapshot {
        DeviceSnapshot::new().with_zone(Zone::Inside, ZoneReading::new(temperature_f, humidity))
    }

    #[test]
    fn starts_zeroed_with_fan_off() {
        let snapshot = DeviceSnapshot::new();
        for zone in Zone::ALL {
            assert_eq!(snapshot.zone(zone), ZoneReading::default());
        }
        assert!(!snapshot.fan_on());
    }

    #[test]
    fn large_move_replaces_and_reports() {
        let mut snapshot = seeded(70.0, 40.0);

        let update = snapshot
            .apply(Zone::Inside, Metric::Temperature, 71.4, DEFAULT_HYSTERESIS)
            .unwrap();

        assert_eq!(snapshot.zone(Zone::Inside).temperature_f, 71.4);
        assert_eq!(update.topic(), "TEMPERATURE_INSIDE");
        assert_eq!(update.payload(), "71");
    }

    #[test]
    fn small_move_is_suppressed() {
        let mut snapshot = seeded(70.0, 40.0);

        let update = snapshot.apply(Zone::Inside, Metric::Temperature, 70.5, DEFAULT_HYSTERESIS);

        assert_eq!(update, None);
        assert_eq!(snapshot.zone(Zone::Inside).temperature_f, 70.0);
    }

    #[test]
    fn exact_threshold_counts_as_a_move() {
        let mut snapshot = seeded(70.0, 40.0);

        let update = snapshot.apply(Zone::Inside, Metric::Humidity, 39.0, DEFAULT_HYSTERESIS);

        assert!(update.is_some());
        assert_eq!(snapshot.zone(Zone::Inside).humidity, 39.0);
    }

    #[test]
    fn suppressed_moves_do_not_accumulate() {
        let mut snapshot = seeded(70.0, 40.0);

        for value in [70.6, 70.9, 70.3, 70.99] {
            assert_eq!(
                snapshot.apply(Zone::Inside, Metric::Temperature, value, DEFAULT_HYSTERESIS),
                None
            );
        }
        assert_eq!(snapshot.zone(Zone::Inside).temperature_f, 70.0);
    }

    #[test]
    fn metrics_and_zones_are_independent() {
        let mut snapshot = seeded(70.0, 40.0);

        assert!(snapshot
            .apply(Zone::Inside, Metric::Humidity, 45.0, DEFAULT_HYSTERESIS)
            .is_some());

        assert_eq!(snapshot.zone(Zone::Inside), ZoneReading::new(70.0, 45.0));
        assert_eq!(snapshot.zone(Zone::Outside), ZoneReading::default());
    }

    #[test]
    fn payload_truncates_toward_zero() {
        let update = |value| MetricUpdate {
            zone: Zone::Outside,
            metric: Metric::Temperature,
            value,
        };

        assert_eq!(update(71.9).payload(), "71");
        assert_eq!(update(-3.7).payload(), "-3");
        assert_eq!(update(-0.5).payload(), "0");
    }

    #[test]
    fn nan_reading_never_replaces_stored_value() {
        let mut snapshot = seeded(70.0, 40.0);

        assert_eq!(
            snapshot.apply(Zone::Inside, Metric::Temperature, f32::NAN, DEFAULT_HYSTERESIS),
            None
        );
        assert_eq!(snapshot.zone(Zone::Inside).temperature_f, 70.0);
    }
}
