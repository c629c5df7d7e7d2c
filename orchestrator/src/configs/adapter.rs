use std::{num::NonZeroUsize, path::Path};

use aggregator::{Evaluator, FedAvg, OptimizerPolicy, Weighting};
use log::info;
use machine_learning::{
    Dataset, MlErr,
    arch::{
        Model, Sequential,
        activations::ActFn,
        layers::Layer,
        loss::{CrossEntropy, LossFn, Mse},
    },
    initialization::{Init, LayerInit, LayeredParamGen, ParamGen},
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
};
use rand::{SeedableRng, rngs::StdRng};
use worker::{LocalTrainer, PartitionStrategy, partition};

use super::{
    ActFnConfig, DatasetConfig, LayerConfig, LossFnConfig, ModelConfig, OptimizerConfig,
    OptimizerPolicyConfig, ParamGenConfig, PartitionConfig, RunConfig, TestConfig,
    WeightingConfig,
};
use crate::{
    availability::AvailabilitySampler,
    error::{OrchestratorError, Result},
    federation::{Federation, RoundSettings},
};

/// The federation every run config turns into.
pub type ConfiguredFederation = Federation<Sequential, Box<dyn Optimizer>, Box<dyn LossFn>>;

const PARTITION_SEED_OFFSET: u64 = 1;
const AVAILABILITY_SEED_OFFSET: u64 = 2;

/// Turns a `RunConfig` into the pieces of a federation.
///
/// Every source of randomness is seeded from the config's seed: the initial parameters use it
/// as is, the data shuffling and partitioning use `seed + 1` and the availability sampling
/// `seed + 2`.
#[derive(Debug, Default)]
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Validates the config and builds the federation it describes.
    ///
    /// # Arguments
    /// * `config` - The run configuration.
    ///
    /// # Returns
    /// The federation or an `InvalidConfig` error naming the offending field. Datasets that
    /// can't be read give an `Io` error.
    pub fn adapt(&self, config: &RunConfig) -> Result<ConfiguredFederation> {
        self.validate(config)?;

        let model = self.adapt_model(&config.model);
        let params = self.adapt_params(&config.model, config.seed)?;

        if params.len() != model.size() {
            return Err(OrchestratorError::InvalidConfig(format!(
                "the initializers generated {} parameters for a model of {}",
                params.len(),
                model.size()
            )));
        }

        let mut data_rng = StdRng::seed_from_u64(config.seed.wrapping_add(PARTITION_SEED_OFFSET));
        let (train, test) = self.adapt_datasets(config, &mut data_rng)?;

        info!(
            "loaded {} training and {} test samples",
            train.len(),
            test.len()
        );

        let partition = partition(
            &train,
            config.worker_count,
            config.batch_size,
            self.adapt_partition(config.partition),
            &mut data_rng,
        )?;

        let optimizers = (0..config.worker_count)
            .map(|_| self.adapt_optimizer(config.optimizer, config.learning_rate, params.len()))
            .collect();

        let trainer = LocalTrainer::new(self.adapt_loss_fn(config.loss))
            .with_log_interval(non_zero(config.log_interval, "log_interval")?);

        let evaluator = Evaluator::new(
            model.clone(),
            self.adapt_loss_fn(config.loss),
            non_zero(config.test_batch_size, "test_batch_size")?,
        );

        let sampler = AvailabilitySampler::new(
            config.p_available,
            config.seed.wrapping_add(AVAILABILITY_SEED_OFFSET),
        )?;

        let settings = RoundSettings {
            local_epochs: config.local_epochs,
            global_rounds: config.global_rounds,
            parallel: config.parallel,
            optimizer_policy: self.adapt_optimizer_policy(config.optimizer_policy),
            output: config.save_final_model.then(|| config.output.clone()),
        };

        Ok(Federation {
            model,
            params,
            optimizers,
            partition,
            test,
            trainer,
            evaluator,
            sampler,
            aggregator: FedAvg::new(self.adapt_weighting(config.weighting)),
            settings,
        })
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Checks every value of the config that can be checked without reading any file.
    pub fn validate(&self, config: &RunConfig) -> Result<()> {
        self.validate_training(config)?;
        self.validate_model(&config.model)?;
        self.validate_dataset(config)
    }

    fn validate_training(&self, config: &RunConfig) -> Result<()> {
        let counts = [
            ("worker_count", config.worker_count),
            ("local_epochs", config.local_epochs),
            ("global_rounds", config.global_rounds),
            ("batch_size", config.batch_size),
            ("test_batch_size", config.test_batch_size),
            ("log_interval", config.log_interval),
        ];

        for (field, value) in counts {
            if value == 0 {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "{field} must be greater than 0"
                )));
            }
        }

        if !(0.0..=1.0).contains(&config.p_available) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "p_available ({}) must be in [0, 1]",
                config.p_available
            )));
        }

        if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
            return Err(OrchestratorError::InvalidConfig(format!(
                "learning_rate ({}) must be a positive number",
                config.learning_rate
            )));
        }

        Ok(())
    }

    fn validate_model(&self, model: &ModelConfig) -> Result<()> {
        let ModelConfig::Sequential { layers } = model;

        if layers.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "model must have at least one layer".into(),
            ));
        }

        for (i, layer) in layers.iter().enumerate() {
            let LayerConfig::Dense { dim: (n, m), .. } = *layer;

            if n == 0 || m == 0 {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "layer {i}: dimensions must be greater than 0, got ({n}, {m})"
                )));
            }
        }

        // Adjacent layers must have compatible dimensions: prev.m == next.n
        for (i, pair) in layers.windows(2).enumerate() {
            let LayerConfig::Dense { dim: (_, prev_m), .. } = pair[0];
            let LayerConfig::Dense { dim: (curr_n, _), .. } = pair[1];

            if prev_m != curr_n {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "layer {}: input size ({curr_n}) does not match previous layer output size \
                     ({prev_m})",
                    i + 1
                )));
            }
        }

        Ok(())
    }

    fn validate_dataset(&self, config: &RunConfig) -> Result<()> {
        let (x_size, y_size) = dataset_dims(&config.dataset);

        if x_size == 0 || y_size == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "dataset x_size and y_size must be greater than 0".into(),
            ));
        }

        let ModelConfig::Sequential { layers } = &config.model;
        if let (Some(first), Some(last)) = (layers.first(), layers.last()) {
            let (fan_in, _, _) = first.sizes();
            let (_, _, fan_out) = last.sizes();

            if fan_in != x_size {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "model input size ({fan_in}) does not match dataset x_size ({x_size})"
                )));
            }

            if fan_out != y_size {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "model output size ({fan_out}) does not match dataset y_size ({y_size})"
                )));
            }
        }

        if let DatasetConfig::Inline { data, .. } = &config.dataset {
            validate_inline("dataset", data, x_size + y_size)?;
        }

        match config.test {
            TestConfig::Split { fraction } if !(fraction > 0.0 && fraction < 1.0) => Err(
                OrchestratorError::InvalidConfig(format!(
                    "test split fraction ({fraction}) must be in (0, 1)"
                )),
            ),
            TestConfig::Inline { ref data } => validate_inline("test", data, x_size + y_size),
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Adaptation
    // -------------------------------------------------------------------------

    fn adapt_model(&self, model: &ModelConfig) -> Sequential {
        let ModelConfig::Sequential { layers } = model;
        Sequential::new(layers.iter().map(|layer| self.adapt_layer(layer)))
    }

    fn adapt_layer(&self, layer: &LayerConfig) -> Layer {
        match *layer {
            LayerConfig::Dense { dim, act_fn, .. } => {
                Layer::dense(dim, self.adapt_act_fn(act_fn.as_ref()))
            }
        }
    }

    fn adapt_act_fn(&self, act_fn: Option<&ActFnConfig>) -> Option<ActFn> {
        match *act_fn? {
            ActFnConfig::Sigmoid { amp } => Some(ActFn::sigmoid(amp)),
        }
    }

    /// Generates the initial global parameters, layer after layer, from a single seeded rng.
    fn adapt_params(&self, model: &ModelConfig, seed: u64) -> Result<Vec<f32>> {
        let ModelConfig::Sequential { layers } = model;
        let layers: Vec<_> = layers.iter().map(|layer| self.adapt_init(layer)).collect();

        let mut param_gen = LayeredParamGen::new(&layers, seed)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("initializer: {e}")))?;

        Ok(param_gen.sample_all())
    }

    fn adapt_init(&self, layer: &LayerConfig) -> LayerInit {
        let LayerConfig::Dense { init, .. } = *layer;
        let (fan_in, size, fan_out) = layer.sizes();

        let init = match init {
            ParamGenConfig::Const { value } => Init::Const(value),
            ParamGenConfig::Uniform { low, high } => Init::Uniform { low, high },
            ParamGenConfig::Normal { mean, std_dev } => Init::Normal { mean, std_dev },
            ParamGenConfig::XavierUniform => Init::XavierUniform,
            ParamGenConfig::Kaiming => Init::Kaiming,
        };

        LayerInit {
            init,
            fan_in,
            fan_out,
            size,
        }
    }

    fn adapt_optimizer(
        &self,
        optimizer: OptimizerConfig,
        learning_rate: f32,
        len: usize,
    ) -> Box<dyn Optimizer> {
        match optimizer {
            OptimizerConfig::GradientDescent => Box::new(GradientDescent::new(learning_rate)),
            OptimizerConfig::Momentum { mu } => {
                Box::new(GradientDescentWithMomentum::new(len, learning_rate, mu))
            }
            OptimizerConfig::Adam { b1, b2, eps } => {
                Box::new(Adam::new(len, learning_rate, b1, b2, eps))
            }
        }
    }

    fn adapt_loss_fn(&self, loss_fn: LossFnConfig) -> Box<dyn LossFn> {
        match loss_fn {
            LossFnConfig::Mse => Box::new(Mse::new()),
            LossFnConfig::CrossEntropy => Box::new(CrossEntropy::new()),
        }
    }

    /// Loads the training dataset and carves out the test set.
    fn adapt_datasets(&self, config: &RunConfig, rng: &mut StdRng) -> Result<(Dataset, Dataset)> {
        let (x_size, y_size) = dataset_dims(&config.dataset);

        let mut train = match &config.dataset {
            DatasetConfig::Inline { data, .. } => {
                build_inline("dataset", data.clone(), x_size, y_size)?
            }
            DatasetConfig::Csv { path, .. } => load_csv(path, x_size, y_size)?,
        };

        if train.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "dataset must have at least one sample".into(),
            ));
        }

        let (train, test) = match &config.test {
            TestConfig::Split { fraction } => {
                train.shuffle(rng);

                let test_len = (train.len() as f32 * fraction).round() as usize;
                let at = train.len().saturating_sub(test_len);
                train.split(at)
            }
            TestConfig::Csv { path } => (train, load_csv(path, x_size, y_size)?),
            TestConfig::Inline { data } => {
                (train, build_inline("test", data.clone(), x_size, y_size)?)
            }
        };

        if train.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "no samples left to train on after the test split".into(),
            ));
        }

        if test.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "test set must have at least one sample".into(),
            ));
        }

        Ok((train, test))
    }

    fn adapt_partition(&self, partition: PartitionConfig) -> PartitionStrategy {
        match partition {
            PartitionConfig::Contiguous => PartitionStrategy::Contiguous,
            PartitionConfig::Shuffled => PartitionStrategy::Shuffled,
            PartitionConfig::WithReplacement => PartitionStrategy::WithReplacement,
        }
    }

    fn adapt_weighting(&self, weighting: WeightingConfig) -> Weighting {
        match weighting {
            WeightingConfig::Uniform => Weighting::Uniform,
            WeightingConfig::SampleCount => Weighting::SampleCount,
        }
    }

    fn adapt_optimizer_policy(&self, policy: OptimizerPolicyConfig) -> OptimizerPolicy {
        match policy {
            OptimizerPolicyConfig::Reset => OptimizerPolicy::Reset,
            OptimizerPolicyConfig::Preserve => OptimizerPolicy::Preserve,
        }
    }
}

fn dataset_dims(dataset: &DatasetConfig) -> (usize, usize) {
    match *dataset {
        DatasetConfig::Inline { x_size, y_size, .. } | DatasetConfig::Csv { x_size, y_size, .. } => {
            (x_size, y_size)
        }
    }
}

fn non_zero(value: usize, field: &str) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value)
        .ok_or_else(|| OrchestratorError::InvalidConfig(format!("{field} must be greater than 0")))
}

fn validate_inline(field: &str, data: &[f32], row_size: usize) -> Result<()> {
    if data.is_empty() {
        return Err(OrchestratorError::InvalidConfig(format!(
            "{field} must have at least one sample"
        )));
    }

    if data.len() % row_size != 0 {
        return Err(OrchestratorError::InvalidConfig(format!(
            "{field} length ({}) is not divisible by x_size + y_size ({row_size})",
            data.len()
        )));
    }

    Ok(())
}

fn build_inline(field: &str, data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Dataset> {
    Dataset::new(data, x_size, y_size)
        .map_err(|e| OrchestratorError::InvalidConfig(format!("{field}: {e}")))
}

fn load_csv(path: &Path, x_size: usize, y_size: usize) -> Result<Dataset> {
    Dataset::from_csv(path, x_size, y_size).map_err(|e| match e {
        MlErr::Io(source) => OrchestratorError::Io {
            path: path.to_path_buf(),
            source,
        },
        e => OrchestratorError::InvalidConfig(format!("'{}': {e}", path.display())),
    })
}
