use ndarray::{Array2, ArrayView2};

use super::{Model, layers::Layer};
use crate::{MlErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns the amount of inputs the first layer expects, if any.
    pub fn input_size(&self) -> Option<usize> {
        self.layers.first().map(|layer| layer.dim().0)
    }

    /// Returns the amount of outputs of the last layer, if any.
    pub fn output_size(&self) -> Option<usize> {
        self.layers.last().map(|layer| layer.dim().1)
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();

        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("model parameters", params.len())?;

        let mut a = x.to_owned();
        let mut start = 0;

        for layer in self.layers.iter_mut() {
            let end = start + layer.size();
            a = layer.forward(&params[start..end], a.view())?;
            start = end;
        }

        Ok(a)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<()> {
        self.check_len("model parameters", params.len())?;
        self.check_len("model gradient", grad.len())?;

        let mut end = params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::activations::ActFn;

    fn two_layers() -> Sequential {
        Sequential::new([
            Layer::dense((2, 3), Some(ActFn::sigmoid(1.0))),
            Layer::dense((3, 1), None),
        ])
    }

    #[test]
    fn size_and_dims() {
        let model = two_layers();
        assert_eq!(model.size(), 3 * 3 + 4);
        assert_eq!(model.input_size(), Some(2));
        assert_eq!(model.output_size(), Some(1));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut model = two_layers();
        let params: Vec<f32> = (0..model.size())
            .map(|i| ((i as f32) * 0.37).sin() * 0.5)
            .collect();
        let x: Array2<f32> = array![[0.2, -0.4], [1.0, 0.5], [-0.3, 0.8]];

        let y_pred = model.forward(&params, x.view()).unwrap();
        let mut grad = vec![0.0; params.len()];
        model
            .backward(&params, &mut grad, Array2::ones(y_pred.dim()))
            .unwrap();

        let h = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += h;
            minus[i] -= h;

            let l_plus = model.forward(&plus, x.view()).unwrap().sum();
            let l_minus = model.forward(&minus, x.view()).unwrap().sum();
            let numeric = (l_plus - l_minus) / (2.0 * h);

            assert!(
                (numeric - grad[i]).abs() < 1e-2,
                "param {i}: numeric {numeric} analytic {}",
                grad[i]
            );
        }
    }

    #[test]
    fn wrong_parameter_count_fails() {
        let mut model = two_layers();
        let x: Array2<f32> = array![[0.0, 0.0]];
        assert!(model.forward(&[0.0; 3], x.view()).is_err());
    }
}
