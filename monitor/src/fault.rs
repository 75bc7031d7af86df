use std::time::Duration;

use repeater_common::ConfigError;
use thiserror::Error;

use crate::network::AssociationError;

/// Faults raised before the first cycle.
#[derive(Debug, Error)]
pub enum StartupFault {
    #[error("configuration unavailable: {0}")]
    Config(#[from] ConfigError),
    #[error("network association failed: {0}")]
    Network(#[from] AssociationError),
    #[error("broker connection failed: {0:#}")]
    Broker(anyhow::Error),
    #[error("hardware initialization failed: {0:#}")]
    Hardware(anyhow::Error),
}

/// Faults that abandon the running cycle.
#[derive(Debug, Error)]
pub enum CycleFault {
    #[error("fan check failed: {0:#}")]
    FanCheck(anyhow::Error),
    #[error("sensor reporting failed: {0:#}")]
    Reporting(anyhow::Error),
    #[error("display phase failed: {0:#}")]
    Display(anyhow::Error),
    #[error("cycle did not finish within {}s", .0.as_secs())]
    DeadlineExceeded(Duration),
}

/// Anything that ends in a restart.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("startup: {0}")]
    Startup(#[from] StartupFault),
    #[error("cycle: {0}")]
    Cycle(#[from] CycleFault),
}

impl Fault {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Startup(StartupFault::Config(_)) => "config",
            Self::Startup(StartupFault::Network(_)) => "network",
            Self::Startup(StartupFault::Broker(_)) => "broker",
            Self::Startup(StartupFault::Hardware(_)) => "hardware",
            Self::Cycle(CycleFault::FanCheck(_)) => "fan-check",
            Self::Cycle(CycleFault::Reporting(_)) => "reporting",
            Self::Cycle(CycleFault::Display(_)) => "display",
            Self::Cycle(CycleFault::DeadlineExceeded(_)) => "deadline",
        }
    }
}
