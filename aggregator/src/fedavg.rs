use log::debug;
use machine_learning::{arch::Model, optimization::Optimizer};
use rayon::prelude::*;
use worker::{WorkerId, WorkerState};

use crate::{AggregationErr, GlobalModel, Result};

/// How much each contribution counts in the average.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    /// Every contributor has the same weight.
    #[default]
    Uniform,
    /// Contributors are weighted by the amount of samples they trained on.
    SampleCount,
}

/// What happens to the optimizer state of the workers when the global model is broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerPolicy {
    #[default]
    Reset,
    Preserve,
}

/// The parameters a worker hands in at the end of its local training.
#[derive(Debug, Clone, Copy)]
pub struct Contribution<'a> {
    pub worker_id: WorkerId,
    pub params: &'a [f32],
    pub samples: usize,
}

/// The outcome of an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    /// A new global model was built from these workers.
    Updated { contributors: Vec<WorkerId> },
    /// Nobody contributed, the global model was left untouched.
    Skipped,
}

impl Aggregation {
    pub fn is_updated(&self) -> bool {
        matches!(self, Aggregation::Updated { .. })
    }
}

/// Federated averaging: the new global parameters are the element-wise mean of the
/// contributors' parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FedAvg {
    weighting: Weighting,
}

impl FedAvg {
    /// Creates a new `FedAvg` aggregator.
    ///
    /// # Arguments
    /// * `weighting` - How much each contribution counts in the average.
    pub fn new(weighting: Weighting) -> Self {
        Self { weighting }
    }

    /// Averages the contributions into a new global model.
    ///
    /// # Arguments
    /// * `global` - The current global model, replaced by the averaged one.
    /// * `contributions` - The parameters of the available workers that didn't diverge.
    ///
    /// # Returns
    /// Whether the global model was updated, or an error if a contribution doesn't have as many
    /// parameters as the global model. On error the global model is left untouched.
    pub fn aggregate(
        &self,
        global: &mut GlobalModel,
        contributions: &[Contribution<'_>],
    ) -> Result<Aggregation> {
        if contributions.is_empty() {
            debug!(
                version = global.version();
                "nothing to aggregate, keeping the previous global model"
            );
            return Ok(Aggregation::Skipped);
        }

        let expected = global.len();
        if let Some(c) = contributions.iter().find(|c| c.params.len() != expected) {
            return Err(AggregationErr::SizeMismatch {
                worker_id: c.worker_id,
                got: c.params.len(),
                expected,
            });
        }

        let mut weights: Vec<f32> = match self.weighting {
            Weighting::Uniform => vec![1.0; contributions.len()],
            Weighting::SampleCount => contributions.iter().map(|c| c.samples as f32).collect(),
        };

        if weights.iter().sum::<f32>() <= 0.0 {
            weights.fill(1.0);
        }

        let total: f32 = weights.iter().sum();
        let mut params = vec![0.0; expected];

        params.par_iter_mut().enumerate().for_each(|(j, p)| {
            let sum: f32 = contributions
                .iter()
                .zip(&weights)
                .map(|(c, w)| w * c.params[j])
                .sum();

            *p = sum / total;
        });

        *global = global.next(params);

        let contributors: Vec<_> = contributions.iter().map(|c| c.worker_id).collect();
        debug!(
            version = global.version();
            "aggregated the parameters of workers {contributors:?}"
        );

        Ok(Aggregation::Updated { contributors })
    }
}

/// Copies the global parameters into every worker, available or not.
///
/// # Arguments
/// * `global` - The model to broadcast.
/// * `workers` - The state of every worker of the federation.
/// * `policy` - Whether to reset the workers' optimizer state.
///
/// # Returns
/// An error if a worker's parameters don't have the global model's length.
pub fn broadcast<M, O>(
    global: &GlobalModel,
    workers: &mut [WorkerState<M, O>],
    policy: OptimizerPolicy,
) -> Result<()>
where
    M: Model,
    O: Optimizer,
{
    for state in workers.iter_mut() {
        state.load_params(global.params())?;

        if policy == OptimizerPolicy::Reset {
            state.reset_optimizer();
        }
    }

    Ok(())
}
