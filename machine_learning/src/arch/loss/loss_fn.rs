use ndarray::{Array2, ArrayView2};

/// A differentiable loss over a batch of predictions.
///
/// Both methods treat every row of `y_pred` as one sample, the loss is the mean over the rows.
pub trait LossFn: Send + Sync {
    /// Computes the loss of the predictions against the targets.
    ///
    /// # Arguments
    /// * `y_pred` - The model's output for the batch.
    /// * `y` - The expected output for the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Computes the derivative of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

impl<L: LossFn + ?Sized> LossFn for Box<L> {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (**self).loss(y_pred, y)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        (**self).loss_prime(y_pred, y)
    }
}
