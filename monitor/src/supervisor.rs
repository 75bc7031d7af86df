use std::time::Duration;

use anyhow::Context;
use repeater_common::{DeviceSnapshot, FanRule, LoopConfig, Metric, Zone, TOPIC_FAN_STATE};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::{
    fault::CycleFault,
    ports::{ClimateSensor, FanDriver, LivenessIndicator, Publisher, SegmentDisplay},
    render::show_readout,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    pub deadline: Duration,
    pub pacing: Duration,
    pub hysteresis: f32,
    pub fan_rule: FanRule,
}

impl From<&LoopConfig> for CycleSettings {
    fn from(config: &LoopConfig) -> Self {
        Self {
            deadline: config.cycle_deadline(),
            pacing: config.pacing(),
            hysteresis: config.hysteresis,
            fan_rule: config.fan_rule,
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

/// Device peripherals. `sensors` is indexed by [`Zone::index`].
pub struct Hardware<S, F, D, L> {
    pub sensors: [S; 3],
    pub fan: F,
    pub display: D,
    pub liveness: L,
}

impl<S, F, D, L> Hardware<S, F, D, L> {
    pub fn sensor_mut(&mut self, zone: Zone) -> &mut S {
        &mut self.sensors[zone.index()]
    }
}

/// Owns the snapshot and every handle one cycle needs, and runs cycles
/// under the deadline.
pub struct Supervisor<S, F, D, L, P> {
    snapshot: DeviceSnapshot,
    hardware: Hardware<S, F, D, L>,
    publisher: P,
    settings: CycleSettings,
}

impl<S, F, D, L, P> Supervisor<S, F, D, L, P>
where
    S: ClimateSensor,
    F: FanDriver,
    D: SegmentDisplay,
    L: LivenessIndicator,
    P: Publisher,
{
    pub fn new(hardware: Hardware<S, F, D, L>, publisher: P, settings: CycleSettings) -> Self {
        Self {
            snapshot: DeviceSnapshot::new(),
            hardware,
            publisher,
            settings,
        }
    }

    pub fn with_snapshot(mut self, snapshot: DeviceSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    /// Back-to-back cycles until one fails. There is no pause between
    /// cycles beyond the render pacing.
    pub async fn run_until_fault(&mut self) -> CycleFault {
        loop {
            if let Err(fault) = self.supervise_cycle().await {
                return fault;
            }
        }
    }

    /// One cycle raced against the deadline. On expiry the cycle future is
    /// dropped wherever it is suspended; partial snapshot updates and sent
    /// messages are left as they are.
    pub async fn supervise_cycle(&mut self) -> Result<(), CycleFault> {
        let deadline = self.settings.deadline;
        match timeout(deadline, self.run_cycle()).await {
            Ok(result) => result,
            Err(_) => Err(CycleFault::DeadlineExceeded(deadline)),
        }
    }

    /// Fan check, then sense-and-publish per zone, then render per zone.
    /// The fan check deliberately sees the previous cycle's readings.
    pub async fn run_cycle(&mut self) -> Result<(), CycleFault> {
        self.check_fan().await.map_err(CycleFault::FanCheck)?;

        for zone in Zone::ALL {
            self.report_zone(zone).await.map_err(CycleFault::Reporting)?;
        }

        for zone in Zone::ALL {
            self.render_zone(zone).await.map_err(CycleFault::Display)?;
        }

        Ok(())
    }

    async fn check_fan(&mut self) -> anyhow::Result<()> {
        let Some(action) = self.settings.fan_rule.evaluate(&self.snapshot) else {
            return Ok(());
        };

        self.hardware
            .fan
            .set_duty(action.duty())
            .context("failed to drive fan output")?;
        self.snapshot.set_fan_on(action.is_on());
        info!("fan turned {}", if action.is_on() { "on" } else { "off" });

        self.publisher
            .publish(TOPIC_FAN_STATE, action.payload())
            .await
            .context("failed to publish fan state")
    }

    async fn report_zone(&mut self, zone: Zone) -> anyhow::Result<()> {
        let reading = self
            .hardware
            .sensor_mut(zone)
            .read()
            .await
            .with_context(|| format!("failed to read {} sensor", zone.as_str()))?;

        let values = [
            (Metric::Temperature, reading.temperature_f()),
            (Metric::Humidity, reading.humidity),
        ];
        for (metric, value) in values {
            let Some(update) = self
                .snapshot
                .apply(zone, metric, value, self.settings.hysteresis)
            else {
                continue;
            };

            let topic = update.topic();
            let payload = update.payload();
            debug!("publishing {topic} = {payload}");
            self.publisher
                .publish(&topic, &payload)
                .await
                .with_context(|| format!("failed to publish {topic}"))?;
        }

        Ok(())
    }

    /// Temperature then humidity, each followed by a liveness toggle and the
    /// pacing delay. Readouts are numbered 1..=6 across the zones.
    async fn render_zone(&mut self, zone: Zone) -> anyhow::Result<()> {
        let reading = self.snapshot.zone(zone);
        let first_index = (zone.index() * 2 + 1) as u8;

        for (offset, metric) in Metric::ALL.into_iter().enumerate() {
            show_readout(
                &mut self.hardware.display,
                first_index + offset as u8,
                reading.get(metric),
            );
            self.hardware
                .liveness
                .toggle()
                .context("failed to toggle liveness indicator")?;
            sleep(self.settings.pacing).await;
        }

        Ok(())
    }
}
