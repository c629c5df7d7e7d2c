pub mod arch;
pub mod dataset;
pub mod error;
pub mod initialization;
pub mod optimization;

pub use dataset::Dataset;
pub use error::{MlErr, Result};
