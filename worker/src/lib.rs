pub mod data;
pub mod error;
mod state;
mod trainer;

pub use data::{Batch, Partition, PartitionStrategy, partition};
pub use error::{Result, WorkerErr};
pub use state::WorkerState;
pub use trainer::{LocalReport, LocalTrainer};

/// The index of a worker in the federation, in `[0, N)`.
pub type WorkerId = usize;
