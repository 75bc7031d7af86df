pub mod fault;
pub mod ht16k33;
pub mod network;
pub mod ports;
pub mod recovery;
pub mod render;
pub mod startup;
pub mod supervisor;

pub use fault::{CycleFault, Fault, StartupFault};
pub use network::{associate, AssociationError, AssociationPolicy, LinkStatus, NetworkLink};
pub use ports::{
    ClimateSensor, DeviceReset, FanDriver, LivenessIndicator, Publisher, SegmentDisplay,
};
pub use recovery::RecoveryController;
pub use startup::{run_device, start, Board, BoardHardware, BoardSupervisor, Started};
pub use supervisor::{CycleSettings, Hardware, Supervisor};

/// Runs cycles until one faults, then hands the fault to `recovery`.
/// With a real [`DeviceReset`] this never returns.
pub async fn run<S, F, D, L, P, R>(
    mut supervisor: Supervisor<S, F, D, L, P>,
    recovery: &mut RecoveryController<R>,
) where
    S: ClimateSensor,
    F: FanDriver,
    D: SegmentDisplay,
    L: LivenessIndicator,
    P: Publisher,
    R: DeviceReset,
{
    let fault = supervisor.run_until_fault().await;
    recovery.recover(&Fault::Cycle(fault)).await;
}
