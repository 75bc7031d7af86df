use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::{fault::Fault, ports::DeviceReset};

/// The single exit path for every fatal condition: log, wait, reset.
pub struct RecoveryController<R> {
    delay: Duration,
    reset: R,
}

impl<R: DeviceReset> RecoveryController<R> {
    pub fn new(delay: Duration, reset: R) -> Self {
        Self { delay, reset }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    pub async fn recover(&mut self, fault: &Fault) {
        match fault {
            Fault::Startup(inner) => error!(
                category = fault.category(),
                "exception during initialization: {inner}"
            ),
            Fault::Cycle(inner) => {
                error!(category = fault.category(), "exception during cycle: {inner}")
            }
        }
        warn!("restarting in {}s", self.delay.as_secs());

        // Lets in-flight network and display I/O drain before the reset.
        sleep(self.delay).await;
        self.reset.reset();
    }
}
