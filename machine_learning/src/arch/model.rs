use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A trainable architecture over a flat parameter buffer.
///
/// A `Model` does not own its parameters, they are lent to it on every pass so that many
/// parameter sets (one per worker) can share the same architecture. Implementations may keep
/// forward metadata between `forward` and `backward`, which is why both take `&mut self` and why
/// every owner of parameters should hold its own clone of the model.
pub trait Model: Clone + Send {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data, one sample per row.
    ///
    /// # Returns
    /// The prediction for the given input or an error if the sizes don't match.
    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Makes a backward pass through the model, the one right after the last `forward` call.
    ///
    /// The gradient is **added** onto `grad`, callers should zero it out between steps.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, the same ones used in the forward pass.
    /// * `grad` - Where to accumulate the gradient of the loss with respect to `params`.
    /// * `d` - The derivative of the loss with respect to the model's output.
    ///
    /// # Returns
    /// An error if the sizes don't match.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;
}
