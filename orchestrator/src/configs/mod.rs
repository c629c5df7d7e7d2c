mod adapter;
mod model;
mod training;

pub use adapter::{Adapter, ConfiguredFederation};
pub use model::{ActFnConfig, LayerConfig, ModelConfig, ParamGenConfig};
pub use training::{
    DatasetConfig, LossFnConfig, OptimizerConfig, OptimizerPolicyConfig, PartitionConfig,
    RunConfig, TestConfig, WeightingConfig,
};
