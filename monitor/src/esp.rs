use core::convert::TryInto;
use std::{
    cell::RefCell,
    net::IpAddr,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use embedded_hal::i2c::I2c as BusI2c;
use embedded_hal_bus::i2c::RcDevice;
use embedded_svc::{
    mqtt::client::{EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        i2c::{I2c, I2cConfig, I2cDriver},
        ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution},
        modem::Modem,
        peripheral::Peripheral,
        prelude::Peripherals,
        units::Hertz,
    },
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::EspWifi,
};
use log::{debug, info, warn};
use sht31::prelude::*;

use repeater_common::{
    ConfigError, DeviceConfig, LoopConfig, RawReading, BROKER_CLIENT_ID,
    BROKER_KEEPALIVE_SECS,
};
use repeater_monitor::{
    ht16k33::{Ht16k33, HT16K33_ADDRESS},
    run_device, Board, BoardHardware, ClimateSensor, DeviceReset, FanDriver, Hardware, LinkStatus,
    LivenessIndicator, NetworkLink, Publisher, RecoveryController,
};

const NVS_NAMESPACE: &str = "repeater";
const NVS_CONFIG_KEY: &str = "config_json";
const MAX_CONFIG_BYTES: usize = 2048;

const I2C0_SDA_PIN: i32 = 16;
const I2C0_SCL_PIN: i32 = 17;
const I2C1_SDA_PIN: i32 = 18;
const I2C1_SCL_PIN: i32 = 19;
const I2C_BAUDRATE_HZ: u32 = 100_000;

const SHT31_MEASURE_DELAY: Duration = Duration::from_millis(16);

const FAN_PWM_PIN: i32 = 22;
const STATUS_LED_PIN: i32 = 2;

const BROKER_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const BROKER_CONNECT_POLL: Duration = Duration::from_millis(250);

/// One device on a shared bus. The supervisor lives on a single thread,
/// so plain `Rc<RefCell<_>>` sharing is enough.
type BusDevice = RcDevice<I2cDriver<'static>>;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build async runtime")?;

    let recovery = RecoveryController::new(LoopConfig::default().recovery_delay(), EspRestart);
    runtime.block_on(run_device(EspBoard::default(), recovery));
    Ok(())
}

/// Claims singletons lazily so that every failure surfaces as a startup
/// fault. The NVS partition is shared by the config store and Wi-Fi.
#[derive(Default)]
struct EspBoard {
    nvs: Option<EspDefaultNvsPartition>,
    modem: Option<Modem>,
}

impl Board for EspBoard {
    type Sensor = Sht31Sensor;
    type Fan = PwmFan;
    type Display = Ht16k33<BusDevice>;
    type Liveness = StatusLed;
    type Link = EspLink;
    type Publisher = EspPublisher;

    fn load_config(&mut self) -> Result<DeviceConfig, ConfigError> {
        let partition =
            EspDefaultNvsPartition::take().map_err(|err| ConfigError::Storage(err.to_string()))?;
        self.nvs = Some(partition.clone());
        load_config(partition)
    }

    fn hardware(&mut self, tuning: &LoopConfig) -> anyhow::Result<BoardHardware<Self>> {
        let Peripherals {
            modem,
            i2c0,
            i2c1,
            ledc,
            ..
        } = Peripherals::take().context("peripherals already taken")?;
        self.modem = Some(modem);

        let fan = PwmFan::new(ledc.timer0, ledc.channel0, tuning.fan_pwm_frequency_hz)?;
        let bus0 = open_bus(i2c0, I2C0_SDA_PIN, I2C0_SCL_PIN).context("i2c0 init failed")?;
        let bus1 = open_bus(i2c1, I2C1_SDA_PIN, I2C1_SCL_PIN).context("i2c1 init failed")?;
        log_scan(0, RcDevice::new(bus0.clone()));
        log_scan(1, RcDevice::new(bus1.clone()));

        let display = Ht16k33::new(
            RcDevice::new(bus1.clone()),
            HT16K33_ADDRESS,
            tuning.display_brightness,
        )?;
        Ok(Hardware {
            // inside, outside, repeater
            sensors: [
                Sht31Sensor::new(RcDevice::new(bus0.clone()), DeviceAddr::AD1),
                Sht31Sensor::new(RcDevice::new(bus0), DeviceAddr::AD0),
                Sht31Sensor::new(RcDevice::new(bus1), DeviceAddr::AD0),
            ],
            fan,
            display,
            liveness: StatusLed::new(STATUS_LED_PIN)?,
        })
    }

    fn network(&mut self) -> anyhow::Result<EspLink> {
        let modem = self
            .modem
            .take()
            .context("modem is claimed together with the peripherals")?;
        let sys_loop = EspSystemEventLoop::take().context("system event loop unavailable")?;
        EspLink::new(modem, sys_loop, self.nvs.clone())
    }

    async fn connect_broker(&mut self, config: &DeviceConfig) -> anyhow::Result<EspPublisher> {
        connect_broker(config).await
    }
}

fn load_config(partition: EspDefaultNvsPartition) -> Result<DeviceConfig, ConfigError> {
    let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)
        .map_err(|err| ConfigError::Storage(err.to_string()))?;
    let mut buffer = vec![0_u8; MAX_CONFIG_BYTES];

    match nvs
        .get_str(NVS_CONFIG_KEY, &mut buffer)
        .map_err(|err| ConfigError::Storage(err.to_string()))?
    {
        Some(raw) => DeviceConfig::from_json(raw),
        None => Err(ConfigError::Missing(NVS_CONFIG_KEY)),
    }
}

fn open_bus<I: I2c>(
    i2c: impl Peripheral<P = I> + 'static,
    sda: i32,
    scl: i32,
) -> anyhow::Result<Rc<RefCell<I2cDriver<'static>>>> {
    let config = I2cConfig::new().baudrate(Hertz(I2C_BAUDRATE_HZ));
    // SAFETY: each pin number is claimed exactly once during startup.
    let (sda, scl) = unsafe { (AnyIOPin::new(sda), AnyIOPin::new(scl)) };
    let driver = I2cDriver::new(i2c, sda, scl, &config)?;
    Ok(Rc::new(RefCell::new(driver)))
}

fn log_scan(index: u8, mut bus: impl BusI2c) {
    let mut byte = [0_u8; 1];
    let found: Vec<String> = (0x08_u8..0x78)
        .filter(|address| bus.read(*address, &mut byte).is_ok())
        .map(|address| format!("{address:#04x}"))
        .collect();
    info!("i2c{index} devices: [{}]", found.join(", "));
}

struct Sht31Sensor {
    device: SHT31<SingleShot, BusDevice, Ets>,
}

impl Sht31Sensor {
    fn new(bus: BusDevice, address: DeviceAddr) -> Self {
        let device = SHT31::new(bus, Ets)
            .with_mode(SingleShot::new())
            .with_precision(Precision::High)
            .with_unit(TemperatureUnit::Celsius)
            .with_address(address);
        Self { device }
    }
}

impl ClimateSensor for Sht31Sensor {
    async fn read(&mut self) -> anyhow::Result<RawReading> {
        self.device
            .measure()
            .map_err(|err| anyhow!("sht31 measure command failed: {err:?}"))?;

        tokio::time::sleep(SHT31_MEASURE_DELAY).await;

        let reading = self
            .device
            .read()
            .map_err(|err| anyhow!("sht31 measurement read failed: {err:?}"))?;
        Ok(RawReading {
            temperature_c: reading.temperature,
            humidity: reading.humidity,
        })
    }
}

struct PwmFan {
    driver: LedcDriver<'static>,
    max_duty: u32,
}

impl PwmFan {
    fn new(
        timer: impl Peripheral<P = esp_idf_svc::hal::ledc::TIMER0> + 'static,
        channel: impl Peripheral<P = esp_idf_svc::hal::ledc::CHANNEL0> + 'static,
        frequency_hz: u32,
    ) -> anyhow::Result<Self> {
        let timer_config = TimerConfig::default()
            .frequency(Hertz(frequency_hz))
            .resolution(Resolution::Bits10);
        let timer = LedcTimerDriver::new(timer, &timer_config).context("fan pwm timer")?;
        // SAFETY: the fan pin is not used anywhere else.
        let pin = unsafe { AnyOutputPin::new(FAN_PWM_PIN) };
        let driver = LedcDriver::new(channel, timer, pin).context("fan pwm channel")?;
        let max_duty = driver.get_max_duty();

        info!("fan pwm on GPIO{FAN_PWM_PIN} @ {frequency_hz}Hz");
        Ok(Self { driver, max_duty })
    }
}

impl FanDriver for PwmFan {
    fn set_duty(&mut self, duty: u16) -> anyhow::Result<()> {
        let scaled = u64::from(duty) * u64::from(self.max_duty) / u64::from(u16::MAX);
        self.driver
            .set_duty(scaled as u32)
            .context("failed to set fan duty")
    }
}

struct StatusLed {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl StatusLed {
    fn new(pin: i32) -> anyhow::Result<Self> {
        // SAFETY: the LED pin is not used anywhere else.
        let mut pin = PinDriver::output(unsafe { AnyOutputPin::new(pin) })?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl LivenessIndicator for StatusLed {
    fn toggle(&mut self) -> anyhow::Result<()> {
        self.pin.toggle().context("status led toggle failed")
    }
}

struct EspLink {
    wifi: EspWifi<'static>,
}

impl EspLink {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sys_loop, nvs_partition).context("wifi driver")?;
        Ok(Self { wifi })
    }
}

impl NetworkLink for EspLink {
    fn begin(&mut self, ssid: &str, password: &str) -> anyhow::Result<()> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        if self.wifi.is_started()? {
            if let Err(err) = self.wifi.disconnect() {
                debug!("wifi disconnect before retry: {err}");
            }
        }

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| anyhow!("wifi ssid too long"))?,
                password: password
                    .try_into()
                    .map_err(|_| anyhow!("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;

        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.wifi.connect()?;
        info!("wifi connecting to `{ssid}`");
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        match (self.wifi.is_connected(), self.wifi.is_up()) {
            (Ok(true), Ok(true)) => LinkStatus::Up,
            (Ok(_), Ok(_)) => LinkStatus::Connecting,
            (Err(err), _) | (_, Err(err)) => LinkStatus::Failed(err.code()),
        }
    }

    fn address(&self) -> Option<IpAddr> {
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| IpAddr::V4(info.ip))
    }
}

async fn connect_broker(config: &DeviceConfig) -> anyhow::Result<EspPublisher> {
    let url = format!("mqtts://{}:{}", config.mqtt_server, config.mqtt_port);
    let conf = MqttClientConfiguration {
        client_id: Some(BROKER_CLIENT_ID),
        username: Some(config.mqtt_client_id.as_str()),
        password: Some(config.mqtt_password.as_str()),
        keep_alive_interval: Some(Duration::from_secs(BROKER_KEEPALIVE_SECS)),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };

    let (client, conn) = EspMqttClient::new(url.as_str(), &conf)?;
    let connected = Arc::new(AtomicBool::new(false));
    spawn_mqtt_receiver(conn, connected.clone())?;

    let mut waited = Duration::ZERO;
    while !connected.load(Ordering::Relaxed) {
        if waited >= BROKER_CONNECT_TIMEOUT {
            bail!(
                "no CONNACK from `{}` within {}s",
                config.mqtt_server,
                BROKER_CONNECT_TIMEOUT.as_secs()
            );
        }
        tokio::time::sleep(BROKER_CONNECT_POLL).await;
        waited += BROKER_CONNECT_POLL;
    }
    info!("mqtt connected to `{}`", config.mqtt_server);

    Ok(EspPublisher { client, connected })
}

fn spawn_mqtt_receiver(
    mut conn: EspMqttConnection,
    connected: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => match event.payload() {
                    EventPayload::Connected(_) => connected.store(true, Ordering::Relaxed),
                    EventPayload::Disconnected => {
                        warn!("mqtt disconnected");
                        connected.store(false, Ordering::Relaxed);
                    }
                    EventPayload::Error(err) => warn!("mqtt error event: {err:?}"),
                    _ => {}
                },
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt receive loop error: {err:?}");
                    thread::sleep(Duration::from_secs(2));
                }
            }
        })
        .context("failed to spawn mqtt receiver thread")?;
    Ok(())
}

struct EspPublisher {
    client: EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
}

impl Publisher for EspPublisher {
    async fn publish(&mut self, topic: &str, payload: &str) -> anyhow::Result<()> {
        if !self.connected.load(Ordering::Relaxed) {
            bail!("broker link is down");
        }
        // Queued for the client task; never waits on the socket.
        self.client
            .enqueue(topic, QoS::AtMostOnce, false, payload.as_bytes())
            .with_context(|| format!("mqtt enqueue to {topic} failed"))?;
        Ok(())
    }
}

struct EspRestart;

impl DeviceReset for EspRestart {
    fn reset(&mut self) {
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}
