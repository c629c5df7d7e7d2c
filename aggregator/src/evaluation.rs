use std::{fmt, num::NonZeroUsize};

use machine_learning::{
    Dataset,
    arch::{Model, loss::LossFn},
};
use ndarray::{ArrayView1, Axis};

use crate::{AggregationErr, Result};

/// The metrics of a model over the test set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Average loss per example.
    pub loss: f32,
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    /// Returns the fraction of correctly classified examples, in `[0, 1]`.
    pub fn accuracy(&self) -> f32 {
        self.correct as f32 / self.total as f32
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Average loss: {:.4}, Accuracy: {}/{} ({:.0}%)",
            self.loss,
            self.correct,
            self.total,
            100.0 * self.accuracy()
        )
    }
}

/// Measures the loss and accuracy of a set of parameters over a held-out test set.
pub struct Evaluator<M, L> {
    model: M,
    loss_fn: L,
    batch_size: NonZeroUsize,
}

impl<M: Model, L: LossFn> Evaluator<M, L> {
    /// Creates a new `Evaluator`.
    ///
    /// # Arguments
    /// * `model` - An instance of the architecture to evaluate.
    /// * `loss_fn` - The loss to report.
    /// * `batch_size` - The amount of test rows per forward pass.
    pub fn new(model: M, loss_fn: L, batch_size: NonZeroUsize) -> Self {
        Self {
            model,
            loss_fn,
            batch_size,
        }
    }

    /// Evaluates the parameters over the test set.
    ///
    /// An example is correct when the index of its largest prediction matches the index of its
    /// largest target.
    ///
    /// # Arguments
    /// * `params` - The parameters to evaluate, left untouched.
    /// * `test` - The test set.
    ///
    /// # Returns
    /// The evaluation or `AggregationErr::EmptyTestSet` if there's nothing to test on.
    pub fn evaluate(&mut self, params: &[f32], test: &Dataset) -> Result<Evaluation> {
        if test.is_empty() {
            return Err(AggregationErr::EmptyTestSet);
        }

        let mut loss_sum = 0.0;
        let mut correct = 0;

        for (x, y) in test.batches(self.batch_size) {
            let y_pred = self.model.forward(params, x)?;

            loss_sum += self.loss_fn.loss(y_pred.view(), y) * x.nrows() as f32;
            correct += y_pred
                .axis_iter(Axis(0))
                .zip(y.axis_iter(Axis(0)))
                .filter(|(pred, target)| argmax(*pred) == argmax(*target))
                .count();
        }

        Ok(Evaluation {
            loss: loss_sum / test.len() as f32,
            correct,
            total: test.len(),
        })
    }
}

fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &x)| {
            if x > max { (i, x) } else { (best, max) }
        })
        .0
}
