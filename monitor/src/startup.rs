//! Boot sequence shared by every backend: config, peripherals, boot splash,
//! network association, broker session, initial fan state.

use anyhow::Context;
use repeater_common::{ConfigError, DeviceConfig, FanAction, LoopConfig, TOPIC_FAN_STATE};
use tracing::info;

use crate::{
    fault::{Fault, StartupFault},
    network::{associate, AssociationPolicy, NetworkLink},
    ports::{ClimateSensor, DeviceReset, FanDriver, LivenessIndicator, Publisher, SegmentDisplay},
    recovery::RecoveryController,
    render::show_readout,
    supervisor::{CycleSettings, Hardware, Supervisor},
};

/// Everything a backend has to provide to bring the monitor up.
#[allow(async_fn_in_trait)]
pub trait Board {
    type Sensor: ClimateSensor;
    type Fan: FanDriver;
    type Display: SegmentDisplay;
    type Liveness: LivenessIndicator;
    type Link: NetworkLink;
    type Publisher: Publisher;

    fn load_config(&mut self) -> Result<DeviceConfig, ConfigError>;

    fn hardware(
        &mut self,
        tuning: &LoopConfig,
    ) -> anyhow::Result<Hardware<Self::Sensor, Self::Fan, Self::Display, Self::Liveness>>;

    fn network(&mut self) -> anyhow::Result<Self::Link>;

    /// Resolves once the broker has accepted the session.
    async fn connect_broker(&mut self, config: &DeviceConfig) -> anyhow::Result<Self::Publisher>;
}

pub type BoardHardware<B> = Hardware<
    <B as Board>::Sensor,
    <B as Board>::Fan,
    <B as Board>::Display,
    <B as Board>::Liveness,
>;

pub type BoardSupervisor<B> = Supervisor<
    <B as Board>::Sensor,
    <B as Board>::Fan,
    <B as Board>::Display,
    <B as Board>::Liveness,
    <B as Board>::Publisher,
>;

pub struct Started<B: Board> {
    pub supervisor: BoardSupervisor<B>,
    /// Owns the network driver; keep it alive as long as the supervisor.
    pub link: B::Link,
}

/// Runs the boot sequence. On success the recovery delay has been taken
/// from the loaded config.
pub async fn start<B, R>(
    board: &mut B,
    recovery: &mut RecoveryController<R>,
) -> Result<Started<B>, StartupFault>
where
    B: Board,
    R: DeviceReset,
{
    let config = board.load_config()?;
    recovery.set_delay(config.tuning.recovery_delay());
    info!(
        "config loaded: ssid=`{}`, broker=`{}:{}`",
        config.wifi_ssid, config.mqtt_server, config.mqtt_port
    );

    let mut hardware = board
        .hardware(&config.tuning)
        .map_err(StartupFault::Hardware)?;
    hardware
        .fan
        .set_duty(FanAction::TurnOff.duty())
        .context("failed to park fan")
        .map_err(StartupFault::Hardware)?;
    show_readout(&mut hardware.display, 0, 0.0);

    let mut link = board.network().map_err(StartupFault::Hardware)?;
    associate(
        &mut link,
        &config.wifi_ssid,
        &config.wifi_password,
        &AssociationPolicy::from(&config.tuning),
    )
    .await?;

    let mut publisher = board
        .connect_broker(&config)
        .await
        .map_err(StartupFault::Broker)?;
    publisher
        .publish(TOPIC_FAN_STATE, FanAction::TurnOff.payload())
        .await
        .context("failed to publish initial fan state")
        .map_err(StartupFault::Broker)?;

    info!("monitor started");
    Ok(Started {
        supervisor: Supervisor::new(hardware, publisher, CycleSettings::from(&config.tuning)),
        link,
    })
}

/// Boots `board` and runs it until the first fault. Startup and cycle
/// faults both end in exactly one delayed reset.
pub async fn run_device<B, R>(mut board: B, mut recovery: RecoveryController<R>)
where
    B: Board,
    R: DeviceReset,
{
    match start(&mut board, &mut recovery).await {
        Ok(Started {
            supervisor,
            link: _link,
        }) => crate::run(supervisor, &mut recovery).await,
        Err(fault) => recovery.recover(&Fault::Startup(fault)).await,
    }
}
