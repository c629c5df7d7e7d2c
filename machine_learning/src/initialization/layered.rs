use std::collections::VecDeque;

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};

use super::ParamGen;
use crate::{MlErr, Result};

/// The scheme a layer's parameters are drawn with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    Const(f32),
    /// Uniform in `[low, high)`.
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
    /// Uniform in `±sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,
    /// Normal with a standard deviation of `sqrt(2 / fan_in)`.
    Kaiming,
}

/// A layer of the model as the initializer sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerInit {
    pub init: Init,
    pub fan_in: usize,
    pub fan_out: usize,
    /// How many parameters the layer owns, weights and biases.
    pub size: usize,
}

enum Source {
    Const(f32),
    Uniform(Uniform<f32>),
    Normal(Normal<f32>),
}

impl Source {
    fn resolve(layer: &LayerInit) -> Result<Self> {
        let source = match layer.init {
            Init::Const(value) => Source::Const(value),
            Init::Uniform { low, high } => Source::Uniform(Uniform::new(low, high)?),
            Init::Normal { mean, std_dev } => Source::Normal(Normal::new(mean, std_dev)?),
            Init::XavierUniform => {
                let range = (6. / (layer.fan_in + layer.fan_out) as f32).sqrt();
                Source::Uniform(Uniform::new(-range, range)?)
            }
            Init::Kaiming => {
                let std_dev = (2. / layer.fan_in as f32).sqrt();
                Source::Normal(Normal::new(0., std_dev)?)
            }
        };

        Ok(source)
    }

    fn draw(&self, rng: &mut StdRng, n: usize) -> Vec<f32> {
        match self {
            Source::Const(value) => vec![*value; n],
            Source::Uniform(d) => (0..n).map(|_| d.sample(rng)).collect(),
            Source::Normal(d) => (0..n).map(|_| d.sample(rng)).collect(),
        }
    }
}

/// Generates the parameters of a whole model, layer after layer, from one seeded rng.
///
/// Every layer is resolved into its distribution up front, so a bad scheme is reported before
/// any value is drawn. Samples may cross layer boundaries.
pub struct LayeredParamGen {
    layers: VecDeque<(Source, usize)>,
    rng: StdRng,
}

impl LayeredParamGen {
    /// Creates a new `LayeredParamGen`.
    ///
    /// # Arguments
    /// * `layers` - The layers of the model, in order.
    /// * `seed` - The seed of the rng every random layer draws from.
    ///
    /// # Returns
    /// The generator, or `MlErr::Distribution` naming the first layer whose scheme is invalid.
    pub fn new(layers: &[LayerInit], seed: u64) -> Result<Self> {
        let layers = layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                Source::resolve(layer)
                    .map(|source| (source, layer.size))
                    .map_err(|e| MlErr::Distribution(format!("layer {i}: {e}")))
            })
            .collect::<Result<VecDeque<_>>>()?;

        Ok(Self {
            layers,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Returns how many parameters are left to generate.
    pub fn remaining(&self) -> usize {
        self.layers.iter().map(|(_, left)| left).sum()
    }
}

impl ParamGen for LayeredParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.remaining() == 0 {
            return None;
        }

        let mut params = Vec::new();

        while params.len() < n {
            let Some((source, left)) = self.layers.front_mut() else {
                break;
            };

            let count = (n - params.len()).min(*left);
            params.extend(source.draw(&mut self.rng, count));
            *left -= count;

            if *left == 0 {
                self.layers.pop_front();
            }
        }

        Some(params)
    }
}
