use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    fan::FanRule,
    snapshot::DEFAULT_HYSTERESIS,
    topics::BROKER_TLS_PORT,
    types::{Metric, Zone},
};

/// Paced renders per cycle: one per zone and metric.
const PACED_RENDERS: u64 = (Zone::ALL.len() * Metric::ALL.len()) as u64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config field `{0}` must not be empty")]
    Empty(&'static str),
    #[error("no config stored under `{0}`")]
    Missing(&'static str),
    #[error("config storage unavailable: {0}")]
    Storage(String),
}

/// Timing and control knobs. Every field has a default so the section can be
/// omitted from the config document entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub cycle_deadline_ms: u64,
    pub pacing_ms: u64,
    pub recovery_delay_ms: u64,
    pub hysteresis: f32,
    pub wifi_poll_attempts: u32,
    pub wifi_poll_interval_ms: u64,
    pub wifi_retry_delay_ms: u64,
    pub wifi_max_retry_delay_ms: u64,
    pub wifi_max_attempts: Option<u32>,
    pub fan_pwm_frequency_hz: u32,
    pub display_brightness: u8,
    pub fan_rule: FanRule,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_deadline_ms: 90_000,
            pacing_ms: 2_000,
            recovery_delay_ms: 20_000,
            hysteresis: DEFAULT_HYSTERESIS,
            wifi_poll_attempts: 10,
            wifi_poll_interval_ms: 1_000,
            wifi_retry_delay_ms: 1_000,
            wifi_max_retry_delay_ms: 30_000,
            wifi_max_attempts: None,
            fan_pwm_frequency_hz: 25_000,
            display_brightness: 10,
            fan_rule: FanRule::default(),
        }
    }
}

impl LoopConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if self.cycle_deadline_ms == 0 {
            self.cycle_deadline_ms = defaults.cycle_deadline_ms;
        }
        // The render pacing alone must leave room inside the deadline.
        self.pacing_ms = self
            .pacing_ms
            .min((self.cycle_deadline_ms - 1) / PACED_RENDERS);
        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            self.hysteresis = defaults.hysteresis;
        }
        self.wifi_poll_attempts = self.wifi_poll_attempts.max(1);
        self.wifi_retry_delay_ms = self.wifi_retry_delay_ms.max(1);
        self.wifi_max_retry_delay_ms = self.wifi_max_retry_delay_ms.max(self.wifi_retry_delay_ms);
        if self.wifi_max_attempts == Some(0) {
            self.wifi_max_attempts = Some(1);
        }
        self.fan_pwm_frequency_hz = self.fan_pwm_frequency_hz.clamp(1_000, 40_000);
        self.display_brightness = self.display_brightness.min(15);
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_millis(self.cycle_deadline_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}

/// The device config document. Key names follow the JSON file deployed to
/// the devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "WIFI_SSID")]
    pub wifi_ssid: String,
    #[serde(rename = "WIFI_PASSWORD")]
    pub wifi_password: String,
    #[serde(rename = "MQTT_SERVER")]
    pub mqtt_server: String,
    #[serde(rename = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: String,
    #[serde(rename = "MQTT_PASSWORD")]
    pub mqtt_password: String,
    #[serde(rename = "MQTT_PORT", default = "default_mqtt_port")]
    pub mqtt_port: u16,
    #[serde(rename = "TUNING", default)]
    pub tuning: LoopConfig,
}

fn default_mqtt_port() -> u16 {
    BROKER_TLS_PORT
}

impl DeviceConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        config.tuning.sanitize();
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi_ssid.trim().is_empty() {
            return Err(ConfigError::Empty("WIFI_SSID"));
        }
        if self.mqtt_server.trim().is_empty() {
            return Err(ConfigError::Empty("MQTT_SERVER"));
        }
        if self.mqtt_client_id.trim().is_empty() {
            return Err(ConfigError::Empty("MQTT_CLIENT_ID"));
        }
        Ok(())
    }
}
