//! Host backend: real broker connection, simulated peripherals.

use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, Transport};
use tokio::{sync::watch, time::timeout};
use tracing::{debug, error, info, warn};

use repeater_common::{
    ConfigError, DeviceConfig, LoopConfig, RawReading, Zone, BROKER_CLIENT_ID,
    BROKER_KEEPALIVE_SECS,
};
use repeater_monitor::{
    run_device, Board, BoardHardware, ClimateSensor, DeviceReset, FanDriver, Hardware, LinkStatus,
    LivenessIndicator, NetworkLink, Publisher, RecoveryController, SegmentDisplay,
};

const CONFIG_PATH: &str = "config.json";
const BROKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const PLAINTEXT_PORT: u16 = 1883;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let recovery = RecoveryController::new(LoopConfig::default().recovery_delay(), ProcessRestart);
    run_device(HostBoard, recovery).await;
    Ok(())
}

/// Real broker, simulated everything else.
struct HostBoard;

impl Board for HostBoard {
    type Sensor = SimulatedSensor;
    type Fan = LoggedFan;
    type Display = ConsoleDisplay;
    type Liveness = LoggedLed;
    type Link = HostLink;
    type Publisher = MqttPublisher;

    fn load_config(&mut self) -> Result<DeviceConfig, ConfigError> {
        DeviceConfig::load(CONFIG_PATH)
    }

    fn hardware(&mut self, _tuning: &LoopConfig) -> anyhow::Result<BoardHardware<Self>> {
        Ok(Hardware {
            sensors: Zone::ALL.map(SimulatedSensor::new),
            fan: LoggedFan::default(),
            display: ConsoleDisplay::default(),
            liveness: LoggedLed::default(),
        })
    }

    fn network(&mut self) -> anyhow::Result<HostLink> {
        Ok(HostLink::default())
    }

    async fn connect_broker(&mut self, config: &DeviceConfig) -> anyhow::Result<MqttPublisher> {
        connect_broker(config).await
    }
}

async fn connect_broker(config: &DeviceConfig) -> anyhow::Result<MqttPublisher> {
    let mut options = MqttOptions::new(
        BROKER_CLIENT_ID,
        config.mqtt_server.as_str(),
        config.mqtt_port,
    );
    options.set_credentials(config.mqtt_client_id.as_str(), config.mqtt_password.as_str());
    options.set_keep_alive(Duration::from_secs(BROKER_KEEPALIVE_SECS));
    if config.mqtt_port == PLAINTEXT_PORT {
        warn!("broker port {PLAINTEXT_PORT} selected, connecting without TLS");
    } else {
        options.set_transport(Transport::tls_with_default_config());
    }

    let (client, mut eventloop) = AsyncClient::new(options, 32);

    timeout(BROKER_CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
        .await
        .map_err(|_| {
            anyhow!(
                "no CONNACK from `{}` within {}s",
                config.mqtt_server,
                BROKER_CONNECT_TIMEOUT.as_secs()
            )
        })??;
    info!("mqtt connected to `{}`", config.mqtt_server);

    let (link_tx, link_rx) = watch::channel(true);
    spawn_mqtt_loop(eventloop, link_tx);

    Ok(MqttPublisher {
        client,
        link: link_rx,
    })
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> anyhow::Result<()> {
    loop {
        let event = eventloop.poll().await.context("mqtt handshake failed")?;
        if let Event::Incoming(Incoming::ConnAck(_)) = event {
            return Ok(());
        }
    }
}

fn spawn_mqtt_loop(mut eventloop: EventLoop, link: watch::Sender<bool>) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt reconnected");
                    link.send_replace(true);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    link.send_replace(false);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

struct MqttPublisher {
    client: AsyncClient,
    link: watch::Receiver<bool>,
}

impl Publisher for MqttPublisher {
    async fn publish(&mut self, topic: &str, payload: &str) -> anyhow::Result<()> {
        if !*self.link.borrow() {
            bail!("broker link is down");
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .context("mqtt request queue closed")
    }
}

/// Stand-in for a network interface; the host is assumed to be online.
#[derive(Default)]
struct HostLink {
    started: bool,
}

impl NetworkLink for HostLink {
    fn begin(&mut self, ssid: &str, _password: &str) -> anyhow::Result<()> {
        debug!("simulated association with `{ssid}`");
        self.started = true;
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        if self.started {
            LinkStatus::Up
        } else {
            LinkStatus::Idle
        }
    }

    fn address(&self) -> Option<IpAddr> {
        self.started.then_some(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

/// Slow sawtooth around a per-zone baseline.
struct SimulatedSensor {
    zone: Zone,
    tick: u64,
}

impl SimulatedSensor {
    fn new(zone: Zone) -> Self {
        Self { zone, tick: 0 }
    }
}

impl ClimateSensor for SimulatedSensor {
    async fn read(&mut self) -> anyhow::Result<RawReading> {
        self.tick = self.tick.saturating_add(1);
        let (base_c, base_rh) = match self.zone {
            Zone::Inside => (21.0, 42.0),
            Zone::Outside => (12.0, 65.0),
            Zone::Repeater => (14.0, 55.0),
        };
        Ok(RawReading {
            temperature_c: base_c + (self.tick % 8) as f32 * 0.4,
            humidity: base_rh + (self.tick % 6) as f32 * 0.5,
        })
    }
}

#[derive(Default)]
struct LoggedFan {
    duty: u16,
}

impl FanDriver for LoggedFan {
    fn set_duty(&mut self, duty: u16) -> anyhow::Result<()> {
        if duty != self.duty {
            info!("fan duty {} -> {duty}", self.duty);
        }
        self.duty = duty;
        Ok(())
    }
}

struct ConsoleDisplay {
    cells: [char; 4],
}

impl Default for ConsoleDisplay {
    fn default() -> Self {
        Self { cells: [' '; 4] }
    }
}

impl SegmentDisplay for ConsoleDisplay {
    fn set_number(&mut self, value: u8, digit: usize) -> anyhow::Result<()> {
        let glyph = char::from_digit(u32::from(value), 16)
            .ok_or_else(|| anyhow!("{value} is not a hex digit"))?;
        self.set_character(glyph.to_ascii_uppercase(), digit)
    }

    fn set_character(&mut self, ch: char, digit: usize) -> anyhow::Result<()> {
        let cell = self
            .cells
            .get_mut(digit)
            .ok_or_else(|| anyhow!("digit {digit} out of range"))?;
        *cell = ch;
        Ok(())
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        let frame: String = self.cells.iter().collect();
        info!("display [{frame}]");
        Ok(())
    }
}

#[derive(Default)]
struct LoggedLed {
    lit: bool,
}

impl LivenessIndicator for LoggedLed {
    fn toggle(&mut self) -> anyhow::Result<()> {
        self.lit = !self.lit;
        debug!("led {}", if self.lit { "on" } else { "off" });
        Ok(())
    }
}

/// Replaces the process with a fresh copy of itself. Falls back to a
/// non-zero exit so an outer supervisor can restart it.
struct ProcessRestart;

impl DeviceReset for ProcessRestart {
    fn reset(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            match std::env::current_exe() {
                Ok(exe) => {
                    let err = std::process::Command::new(exe)
                        .args(std::env::args_os().skip(1))
                        .exec();
                    error!("re-exec failed: {err}");
                }
                Err(err) => error!("cannot locate current executable: {err}"),
            }
        }
        std::process::exit(1);
    }
}
