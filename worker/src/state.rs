use machine_learning::{
    arch::{Model, loss::LossFn},
    optimization::Optimizer,
};
use ndarray::ArrayView2;

use crate::{Result, WorkerErr, WorkerId};

/// The private state of a worker, mutated in place by local training.
///
/// Every worker owns its model scratch, parameters, gradient buffer and optimizer, so no two
/// workers ever share mutable state.
pub struct WorkerState<M, O> {
    id: WorkerId,
    model: M,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    steps: u64,
}

impl<M: Model, O: Optimizer> WorkerState<M, O> {
    /// Creates a new `WorkerState`.
    ///
    /// # Arguments
    /// * `id` - The id of the worker.
    /// * `model` - The worker's own instance of the shared architecture.
    /// * `params` - A copy of the initial global parameters.
    /// * `optimizer` - The optimizer bound to these parameters.
    ///
    /// # Returns
    /// A new `WorkerState` or an error if `params` doesn't fit the model.
    pub fn new(id: WorkerId, model: M, params: Vec<f32>, optimizer: O) -> Result<Self> {
        if params.len() != model.size() {
            return Err(WorkerErr::ParamsLengthMismatch {
                worker_id: id,
                got: params.len(),
                expected: model.size(),
            });
        }

        Ok(Self {
            id,
            grad: vec![0.0; params.len()],
            model,
            params,
            optimizer,
            steps: 0,
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    /// Returns the total amount of optimizer steps this worker took.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[inline]
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Overwrites the local parameters with a copy of `params`.
    ///
    /// # Returns
    /// An error if the lengths differ, in which case nothing is written.
    pub fn load_params(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(WorkerErr::ParamsLengthMismatch {
                worker_id: self.id,
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(params);
        Ok(())
    }

    pub fn reset_optimizer(&mut self) {
        self.optimizer.reset();
    }

    /// Runs one forward/backward pass over a batch and applies an optimizer update.
    ///
    /// # Returns
    /// The loss of the batch before the update.
    pub(crate) fn train_step<L: LossFn>(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        loss_fn: &L,
    ) -> Result<f32> {
        self.zero_grad();

        let y_pred = self.model.forward(&self.params, x)?;
        let loss = loss_fn.loss(y_pred.view(), y);
        let d = loss_fn.loss_prime(y_pred.view(), y);

        self.model.backward(&self.params, &mut self.grad, d)?;
        self.optimizer.update_params(&self.grad, &mut self.params)?;
        self.steps += 1;

        Ok(loss)
    }
}
