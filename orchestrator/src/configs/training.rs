use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::{Adapter, ModelConfig};
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnConfig {
    Mse,
    #[default]
    CrossEntropy,
}

/// The optimizer of every worker, the learning rate is shared by all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    #[default]
    GradientDescent,
    Momentum {
        #[serde(default = "default_mu")]
        mu: f32,
    },
    Adam {
        #[serde(default = "default_b1")]
        b1: f32,
        #[serde(default = "default_b2")]
        b2: f32,
        #[serde(default = "default_eps")]
        eps: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetConfig {
    Inline {
        data: Vec<f32>,
        x_size: usize,
        y_size: usize,
    },
    Csv {
        path: PathBuf,
        x_size: usize,
        y_size: usize,
    },
}

/// Where the held-out test set comes from, its rows have the training dataset's layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestConfig {
    /// The last `fraction` of the shuffled training rows.
    Split { fraction: f32 },
    Csv { path: PathBuf },
    Inline { data: Vec<f32> },
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig::Split { fraction: 0.2 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionConfig {
    Contiguous,
    #[default]
    Shuffled,
    WithReplacement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingConfig {
    #[default]
    Uniform,
    SampleCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerPolicyConfig {
    #[default]
    Reset,
    Preserve,
}

/// Everything a simulation run needs, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub worker_count: usize,
    pub local_epochs: usize,
    pub global_rounds: usize,
    pub batch_size: usize,
    pub p_available: f64,
    pub learning_rate: f32,
    pub seed: u64,
    #[serde(default)]
    pub save_final_model: bool,

    #[serde(default = "default_test_batch_size")]
    pub test_batch_size: usize,
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub weighting: WeightingConfig,
    #[serde(default)]
    pub optimizer_policy: OptimizerPolicyConfig,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_output")]
    pub output: PathBuf,

    pub model: ModelConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub loss: LossFnConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub test: TestConfig,
}

impl RunConfig {
    /// Loads a `RunConfig` from a JSON file.
    ///
    /// # Arguments
    /// * `path` - The path to the file.
    ///
    /// # Returns
    /// The parsed configuration or an error if the file can't be read or parsed. The values are
    /// not validated.
    pub fn from_json_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();

        let content = fs::read_to_string(&path).map_err(|source| OrchestratorError::Io {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|e| {
            OrchestratorError::InvalidConfig(format!("cannot parse '{}': {e}", path.display()))
        })
    }

    /// Checks the values of the config, without reading any dataset.
    ///
    /// # Returns
    /// An `InvalidConfig` error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        Adapter::new().validate(self)
    }
}

fn default_mu() -> f32 {
    0.9
}

fn default_b1() -> f32 {
    0.9
}

fn default_b2() -> f32 {
    0.999
}

fn default_eps() -> f32 {
    1e-8
}

fn default_test_batch_size() -> usize {
    1000
}

fn default_log_interval() -> usize {
    10
}

fn default_output() -> PathBuf {
    PathBuf::from("global_model.safetensors")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::{LayerConfig, ParamGenConfig};

    #[test]
    fn minimal_json_takes_defaults() {
        let json = r#"{
            "worker_count": 4,
            "local_epochs": 1,
            "global_rounds": 2,
            "batch_size": 8,
            "p_available": 0.5,
            "learning_rate": 0.01,
            "seed": 1,
            "model": { "sequential": { "layers": [ { "dense": { "dim": [2, 1] } } ] } },
            "dataset": { "inline": { "data": [0.0, 1.0, 2.0], "x_size": 2, "y_size": 1 } }
        }"#;

        let config: RunConfig = serde_json::from_str(json).unwrap();

        assert!(!config.save_final_model);
        assert_eq!(config.test_batch_size, 1000);
        assert_eq!(config.log_interval, 10);
        assert_eq!(config.partition, PartitionConfig::Shuffled);
        assert_eq!(config.optimizer, OptimizerConfig::GradientDescent);
        assert_eq!(config.loss, LossFnConfig::CrossEntropy);
        assert_eq!(config.test, TestConfig::Split { fraction: 0.2 });
        assert_eq!(config.output, PathBuf::from("global_model.safetensors"));

        let ModelConfig::Sequential { layers } = &config.model;
        assert_eq!(
            layers[0],
            LayerConfig::Dense {
                dim: (2, 1),
                init: ParamGenConfig::XavierUniform,
                act_fn: None,
            }
        );
    }

    #[test]
    fn hyperparameters_have_defaults() {
        let optimizer: OptimizerConfig = serde_json::from_str(r#"{ "adam": {} }"#).unwrap();
        assert_eq!(
            optimizer,
            OptimizerConfig::Adam {
                b1: 0.9,
                b2: 0.999,
                eps: 1e-8,
            }
        );

        let optimizer: OptimizerConfig =
            serde_json::from_str(r#"{ "momentum": { "mu": 0.5 } }"#).unwrap();
        assert_eq!(optimizer, OptimizerConfig::Momentum { mu: 0.5 });
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = RunConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, OrchestratorError::Io { .. }));
    }
}
