use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

/// Mean squared error loss function.
///
/// The squared errors are summed over the outputs of a sample and averaged over the samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let rows = y_pred.nrows().max(1) as f32;

        (&y_pred - &y)
            .mapv(|x| x.powi(2))
            .sum_axis(Axis(1))
            .sum()
            / rows
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let rows = y_pred.nrows().max(1) as f32;
        (&y_pred - &y) * (2.0 / rows)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn averages_over_rows() {
        let y_pred: Array2<f32> = array![[1.0, 2.0], [0.0, 0.0]];
        let y: Array2<f32> = array![[0.0, 0.0], [0.0, 1.0]];

        // (1 + 4) + 1, over 2 rows
        assert_eq!(Mse.loss(y_pred.view(), y.view()), 3.0);
        assert_eq!(
            Mse.loss_prime(y_pred.view(), y.view()),
            array![[1.0f32, 2.0], [0.0, -1.0]]
        );
    }
}
