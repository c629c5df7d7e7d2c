use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

const EPS: f32 = 1e-7;

/// Softmax followed by the negative log likelihood of the target distribution.
///
/// Takes the raw scores of the model, targets are expected to be one-hot rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn softmax(scores: ArrayView2<f32>) -> Array2<f32> {
        let mut p = scores.to_owned();

        for mut row in p.outer_iter_mut() {
            let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
            row.mapv_inplace(|x| (x - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|x| x / sum);
        }

        p
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let rows = y_pred.nrows().max(1) as f32;
        let p = Self::softmax(y_pred);

        let total: f32 = (&y * &p.mapv(|p| p.max(EPS).ln()))
            .sum_axis(Axis(1))
            .sum();

        -total / rows
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let rows = y_pred.nrows().max(1) as f32;
        (Self::softmax(y_pred) - &y) / rows
    }
}
