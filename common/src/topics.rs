use crate::types::{Metric, Zone};

pub const TOPIC_FAN_STATE: &str = "FAN_STATE";

pub const BROKER_CLIENT_ID: &str = "repeater_pico";
pub const BROKER_KEEPALIVE_SECS: u64 = 7_200;
pub const BROKER_TLS_PORT: u16 = 8883;

/// `TEMPERATURE_INSIDE`, `HUMIDITY_REPEATER`, ...
pub fn metric_topic(metric: Metric, zone: Zone) -> String {
    format!("{}_{}", metric.as_str(), zone.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_topics_concatenate_metric_and_zone() {
        assert_eq!(
            metric_topic(Metric::Temperature, Zone::Inside),
            "TEMPERATURE_INSIDE"
        );
        assert_eq!(
            metric_topic(Metric::Humidity, Zone::Repeater),
            "HUMIDITY_REPEATER"
        );
    }
}
