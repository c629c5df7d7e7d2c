pub mod error;
mod evaluation;
mod fedavg;
mod global;

pub use error::{AggregationErr, Result};
pub use evaluation::{Evaluation, Evaluator};
pub use fedavg::{Aggregation, Contribution, FedAvg, OptimizerPolicy, Weighting, broadcast};
pub use global::GlobalModel;
