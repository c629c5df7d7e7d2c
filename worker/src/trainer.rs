use std::num::NonZeroUsize;

use log::debug;
use machine_learning::{
    arch::{Model, loss::LossFn},
    optimization::Optimizer,
};

use crate::{Batch, Result, WorkerErr, WorkerId, WorkerState};

/// What a worker did during one round of local training.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalReport {
    pub worker_id: WorkerId,
    pub steps: usize,
    pub samples: usize,
    pub mean_loss: f32,
    /// Steps that couldn't run because the stream ran out of batches.
    pub skipped: usize,
}

/// Runs the local training of the available workers.
///
/// The trainer holds no per-worker state, so a single instance can be shared by every worker,
/// even across threads.
pub struct LocalTrainer<L> {
    loss_fn: L,
    log_interval: NonZeroUsize,
}

impl<L: LossFn> LocalTrainer<L> {
    /// Creates a new `LocalTrainer`.
    ///
    /// # Arguments
    /// * `loss_fn` - The loss minimized by every worker.
    pub fn new(loss_fn: L) -> Self {
        Self {
            loss_fn,
            log_interval: NonZeroUsize::MIN,
        }
    }

    /// Sets how many steps to wait between progress logs.
    pub fn with_log_interval(mut self, log_interval: NonZeroUsize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn loss_fn(&self) -> &L {
        &self.loss_fn
    }

    /// Trains the worker on a single batch, updating its parameters in place.
    ///
    /// # Arguments
    /// * `state` - The state of the worker that owns `batch`.
    /// * `batch` - The mini-batch to train on.
    ///
    /// # Returns
    /// The loss of the batch, or `WorkerErr::Diverged` if the loss or any updated parameter is
    /// no longer finite.
    pub fn step<M, O>(&self, state: &mut WorkerState<M, O>, batch: &Batch) -> Result<f32>
    where
        M: Model,
        O: Optimizer,
    {
        let loss = state.train_step(batch.x.view(), batch.y.view(), &self.loss_fn)?;

        if !loss.is_finite() || state.params().iter().any(|p| !p.is_finite()) {
            return Err(WorkerErr::Diverged {
                worker_id: state.id(),
                step: state.steps(),
                loss,
            });
        }

        Ok(loss)
    }

    /// Runs `local_epochs` passes over the first `steps` batches of the worker's stream.
    ///
    /// Every batch index is visited at most once per epoch. When the stream is shorter than
    /// `steps` the missing steps are skipped and counted in `LocalReport::skipped`, the caller
    /// decides how to report the underrun.
    ///
    /// # Arguments
    /// * `state` - The state of the worker.
    /// * `stream` - The worker's batches, in training order.
    /// * `local_epochs` - The amount of passes to make.
    /// * `steps` - The synchronized step count of the round.
    ///
    /// # Returns
    /// A report of the training or the first error found, in which case the state should be
    /// considered diverged.
    pub fn train_round<M, O>(
        &self,
        state: &mut WorkerState<M, O>,
        stream: &[Batch],
        local_epochs: usize,
        steps: usize,
    ) -> Result<LocalReport>
    where
        M: Model,
        O: Optimizer,
    {
        let worker_id = state.id();
        let available = steps.min(stream.len());
        let skipped = (steps - available) * local_epochs;

        let interval = self.log_interval.get();
        let mut report = LocalReport {
            worker_id,
            steps: 0,
            samples: 0,
            mean_loss: 0.0,
            skipped,
        };

        let mut total_loss = 0.0;

        for epoch in 1..=local_epochs {
            for (i, batch) in stream[..available].iter().enumerate() {
                let loss = self.step(state, batch)?;

                total_loss += loss;
                report.steps += 1;
                report.samples += batch.len();

                if (i + 1) % interval == 0 {
                    debug!(
                        worker_id = worker_id, epoch = epoch;
                        "[{}/{available}] loss: {loss:.6}",
                        i + 1,
                    );
                }
            }
        }

        if report.steps > 0 {
            report.mean_loss = total_loss / report.steps as f32;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{Sequential, layers::Layer, loss::Mse},
        optimization::GradientDescent,
    };
    use ndarray::array;

    use super::*;

    fn linear_state(lr: f32) -> WorkerState<Sequential, GradientDescent> {
        let model = Sequential::new([Layer::dense((1, 1), None)]);
        WorkerState::new(0, model, vec![0.0, 0.0], GradientDescent::new(lr)).unwrap()
    }

    fn batch(x: f32, y: f32) -> Batch {
        Batch {
            worker_id: 0,
            x: array![[x]],
            y: array![[y]],
        }
    }

    #[test]
    fn step_moves_towards_the_target() {
        let trainer = LocalTrainer::new(Mse);
        let mut state = linear_state(0.25);

        // d = 2 * (0 - 2) = -4, so w = 0.25 * 4 * x and b = 0.25 * 4
        let loss = trainer.step(&mut state, &batch(1.0, 2.0)).unwrap();

        assert_eq!(loss, 4.0);
        assert_eq!(state.params(), [1.0, 1.0]);
        assert_eq!(state.steps(), 1);
    }

    #[test]
    fn runs_steps_for_every_epoch() {
        let trainer = LocalTrainer::new(Mse);
        let mut state = linear_state(0.01);
        let stream = [batch(1.0, 1.0), batch(2.0, 2.0), batch(3.0, 3.0)];

        let report = trainer.train_round(&mut state, &stream, 3, 2).unwrap();

        assert_eq!(report.steps, 6);
        assert_eq!(report.samples, 6);
        assert_eq!(report.skipped, 0);
        assert_eq!(state.steps(), 6);
    }

    #[test]
    fn short_stream_counts_the_skipped_steps() {
        let trainer = LocalTrainer::new(Mse);
        let mut state = linear_state(0.01);
        let stream = [batch(1.0, 1.0)];

        let report = trainer.train_round(&mut state, &stream, 2, 3).unwrap();

        assert_eq!(report.steps, 2);
        assert_eq!(report.skipped, 4);
        assert_eq!(state.steps(), 2);
    }

    #[test]
    fn huge_learning_rate_diverges() {
        let trainer = LocalTrainer::new(Mse);
        let mut state = linear_state(1e30);
        let stream = [batch(1e10, -1e10)];

        let err = trainer.train_round(&mut state, &stream, 5, 1).unwrap_err();
        assert!(matches!(err, WorkerErr::Diverged { worker_id: 0, .. }));
    }
}
