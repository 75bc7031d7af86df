#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::bail;
use repeater_common::{RawReading, Zone};
use repeater_monitor::{
    ClimateSensor, CycleSettings, DeviceReset, FanDriver, Hardware, LivenessIndicator, Publisher,
    SegmentDisplay, Supervisor,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Read(Zone),
    FanDuty(u16),
    Publish(String, String),
    Draw(String),
    Toggle,
    LoadConfig,
    Associate(String),
    BrokerConnect(String),
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn publishes(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Publish(topic, payload) => Some((topic, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Draw(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn toggles(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Toggle)
            .count()
    }

    pub fn position(&self, wanted: &Event) -> Option<usize> {
        self.events().iter().position(|event| event == wanted)
    }
}

pub fn celsius(temp_f: f32) -> f32 {
    (temp_f - 32.0) * 5.0 / 9.0
}

/// Replays queued readings (`None` = bus error), then repeats the last good one.
pub struct ScriptedSensor {
    zone: Zone,
    journal: Journal,
    queue: VecDeque<Option<RawReading>>,
    last: RawReading,
}

impl ScriptedSensor {
    pub fn steady(zone: Zone, journal: &Journal, temp_f: f32, humidity: f32) -> Self {
        Self {
            zone,
            journal: journal.clone(),
            queue: VecDeque::new(),
            last: RawReading {
                temperature_c: celsius(temp_f),
                humidity,
            },
        }
    }

    pub fn then(mut self, temp_f: f32, humidity: f32) -> Self {
        self.queue.push_back(Some(RawReading {
            temperature_c: celsius(temp_f),
            humidity,
        }));
        self
    }

    pub fn then_fail(mut self) -> Self {
        self.queue.push_back(None);
        self
    }
}

impl ClimateSensor for ScriptedSensor {
    async fn read(&mut self) -> anyhow::Result<RawReading> {
        self.journal.push(Event::Read(self.zone));
        match self.queue.pop_front() {
            Some(Some(reading)) => {
                self.last = reading;
                Ok(reading)
            }
            Some(None) => bail!("i2c transaction not acknowledged"),
            None => Ok(self.last),
        }
    }
}

pub struct FakeFan {
    journal: Journal,
    broken: bool,
}

impl FanDriver for FakeFan {
    fn set_duty(&mut self, duty: u16) -> anyhow::Result<()> {
        if self.broken {
            bail!("pwm channel unavailable");
        }
        self.journal.push(Event::FanDuty(duty));
        Ok(())
    }
}

pub struct FakeDisplay {
    journal: Journal,
    cells: [char; 4],
    broken: bool,
}

impl SegmentDisplay for FakeDisplay {
    fn set_number(&mut self, value: u8, digit: usize) -> anyhow::Result<()> {
        if self.broken {
            bail!("display did not acknowledge");
        }
        self.cells[digit] = char::from_digit(u32::from(value), 16).unwrap_or('?');
        Ok(())
    }

    fn set_character(&mut self, ch: char, digit: usize) -> anyhow::Result<()> {
        if self.broken {
            bail!("display did not acknowledge");
        }
        self.cells[digit] = ch;
        Ok(())
    }

    fn draw(&mut self) -> anyhow::Result<()> {
        self.journal.push(Event::Draw(self.cells.iter().collect()));
        Ok(())
    }
}

pub struct FakeIndicator {
    journal: Journal,
    broken: bool,
}

impl LivenessIndicator for FakeIndicator {
    fn toggle(&mut self) -> anyhow::Result<()> {
        if self.broken {
            bail!("gpio write failed");
        }
        self.journal.push(Event::Toggle);
        Ok(())
    }
}

/// Records a publish once it completes. From call number `stall_from`
/// onwards every publish first sleeps for `stall`.
pub struct RecordingPublisher {
    journal: Journal,
    calls: usize,
    stall_from: Option<usize>,
    stall: Duration,
    fail_from: Option<usize>,
}

impl RecordingPublisher {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            calls: 0,
            stall_from: None,
            stall: Duration::ZERO,
            fail_from: None,
        }
    }

    pub fn stalling_from(mut self, call: usize, stall: Duration) -> Self {
        self.stall_from = Some(call);
        self.stall = stall;
        self
    }

    pub fn failing_from(mut self, call: usize) -> Self {
        self.fail_from = Some(call);
        self
    }
}

impl Publisher for RecordingPublisher {
    async fn publish(&mut self, topic: &str, payload: &str) -> anyhow::Result<()> {
        self.calls += 1;
        if self.fail_from.is_some_and(|call| self.calls >= call) {
            bail!("broker connection lost");
        }
        if self.stall_from.is_some_and(|call| self.calls >= call) {
            tokio::time::sleep(self.stall).await;
        }
        self.journal
            .push(Event::Publish(topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct CountingReset(Arc<AtomicU32>);

impl CountingReset {
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl DeviceReset for CountingReset {
    fn reset(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct Faults {
    pub fan: bool,
    pub display: bool,
    pub liveness: bool,
}

pub type TestHardware = Hardware<ScriptedSensor, FakeFan, FakeDisplay, FakeIndicator>;

pub type TestSupervisor =
    Supervisor<ScriptedSensor, FakeFan, FakeDisplay, FakeIndicator, RecordingPublisher>;

/// `sensors` in zone order: inside, outside, repeater.
pub fn hardware(journal: &Journal, sensors: [ScriptedSensor; 3], faults: Faults) -> TestHardware {
    Hardware {
        sensors,
        fan: FakeFan {
            journal: journal.clone(),
            broken: faults.fan,
        },
        display: FakeDisplay {
            journal: journal.clone(),
            cells: [' '; 4],
            broken: faults.display,
        },
        liveness: FakeIndicator {
            journal: journal.clone(),
            broken: faults.liveness,
        },
    }
}

pub fn supervisor(
    journal: &Journal,
    sensors: [ScriptedSensor; 3],
    publisher: RecordingPublisher,
    faults: Faults,
    settings: CycleSettings,
) -> TestSupervisor {
    Supervisor::new(hardware(journal, sensors, faults), publisher, settings)
}

/// Sensors whose readings never move far from `(temp_f, humidity)`.
pub fn steady_sensors(journal: &Journal, readings: [(f32, f32); 3]) -> [ScriptedSensor; 3] {
    let [inside, outside, repeater] = readings;
    [
        ScriptedSensor::steady(Zone::Inside, journal, inside.0, inside.1),
        ScriptedSensor::steady(Zone::Outside, journal, outside.0, outside.1),
        ScriptedSensor::steady(Zone::Repeater, journal, repeater.0, repeater.1),
    ]
}
