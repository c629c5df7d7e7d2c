pub mod availability;
pub mod checkpoint;
pub mod configs;
pub mod error;
pub mod federation;

use log::info;

pub use availability::{AvailabilityMask, AvailabilitySampler};
pub use configs::{Adapter, RunConfig};
pub use error::{OrchestratorError, Result};
pub use federation::{Federation, Phase, RoundOrchestrator, RoundRecord, RoundSettings, RunSummary};

/// Runs a whole federated training simulation.
///
/// # Arguments
/// * `config` - The run configuration, validated before anything else happens.
///
/// # Returns
/// The summary of the run or the first error that aborted it.
pub fn train(config: &RunConfig) -> Result<RunSummary> {
    info!("adapting config");
    let federation = Adapter::new().adapt(config)?;

    info!(
        "training {} workers for {} rounds, p_available = {}",
        config.worker_count, config.global_rounds, config.p_available
    );

    RoundOrchestrator::new(federation)?.run()
}
