//! Startup network association. This is the only retry loop on the device;
//! once the supervisor is running every failure ends in a restart instead.

use std::{net::IpAddr, time::Duration};

use repeater_common::LoopConfig;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    Up,
    /// Driver specific failure code (wrong password, no AP, ...).
    Failed(i32),
}

impl LinkStatus {
    fn is_settled(self) -> bool {
        matches!(self, Self::Up | Self::Failed(_))
    }
}

pub trait NetworkLink {
    /// Starts associating; completion is observed through [`status`](Self::status).
    fn begin(&mut self, ssid: &str, password: &str) -> anyhow::Result<()>;
    fn status(&mut self) -> LinkStatus;
    fn address(&self) -> Option<IpAddr>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationPolicy {
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// `None` keeps trying forever.
    pub max_attempts: Option<u32>,
}

impl From<&LoopConfig> for AssociationPolicy {
    fn from(config: &LoopConfig) -> Self {
        Self {
            poll_attempts: config.wifi_poll_attempts,
            poll_interval: Duration::from_millis(config.wifi_poll_interval_ms),
            retry_delay: Duration::from_millis(config.wifi_retry_delay_ms),
            max_retry_delay: Duration::from_millis(config.wifi_max_retry_delay_ms),
            max_attempts: config.wifi_max_attempts,
        }
    }
}

impl Default for AssociationPolicy {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum AssociationError {
    #[error("no association after {attempts} attempt(s), last status {last:?}")]
    Exhausted { attempts: u32, last: LinkStatus },
}

/// Associates with `ssid`, returning the number of attempts it took.
pub async fn associate<N: NetworkLink>(
    link: &mut N,
    ssid: &str,
    password: &str,
    policy: &AssociationPolicy,
) -> Result<u32, AssociationError> {
    let mut attempt = 0_u32;
    let mut delay = policy.retry_delay;

    loop {
        attempt = attempt.saturating_add(1);
        let status = match link.begin(ssid, password) {
            Ok(()) => wait_until_settled(link, policy).await,
            Err(err) => {
                warn!("wifi connect request failed on attempt {attempt}: {err:#}");
                link.status()
            }
        };

        if status == LinkStatus::Up {
            match link.address() {
                Some(address) => info!("wifi connected to `{ssid}`, ip = {address}"),
                None => info!("wifi connected to `{ssid}`"),
            }
            return Ok(attempt);
        }

        warn!("network connection failed on attempt {attempt} ({status:?}), retrying");
        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Err(AssociationError::Exhausted {
                attempts: attempt,
                last: status,
            });
        }

        sleep(delay).await;
        delay = delay.saturating_mul(2).min(policy.max_retry_delay);
    }
}

async fn wait_until_settled<N: NetworkLink>(
    link: &mut N,
    policy: &AssociationPolicy,
) -> LinkStatus {
    for _ in 0..policy.poll_attempts {
        let status = link.status();
        if status.is_settled() {
            return status;
        }
        sleep(policy.poll_interval).await;
    }
    link.status()
}
