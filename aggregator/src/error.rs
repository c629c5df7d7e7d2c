use std::{
    error::Error,
    fmt::{self, Display},
};

use machine_learning::MlErr;
use worker::{WorkerErr, WorkerId};

/// The aggregator module's result type.
pub type Result<T> = std::result::Result<T, AggregationErr>;

/// The aggregator module's error type.
#[derive(Debug)]
pub enum AggregationErr {
    SizeMismatch {
        worker_id: WorkerId,
        got: usize,
        expected: usize,
    },
    EmptyTestSet,
    Worker(WorkerErr),
    Ml(MlErr),
}

impl Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregationErr::SizeMismatch {
                worker_id,
                got,
                expected,
            } => format!(
                "Worker {worker_id} sent {got} parameters but the global model has {expected}"
            ),
            AggregationErr::EmptyTestSet => "The test set is empty".to_string(),
            AggregationErr::Worker(e) => format!("Worker error: {e}"),
            AggregationErr::Ml(e) => format!("Machine learning error: {e}"),
        };

        write!(f, "{s}")
    }
}

impl Error for AggregationErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AggregationErr::Worker(e) => Some(e),
            AggregationErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WorkerErr> for AggregationErr {
    fn from(value: WorkerErr) -> Self {
        Self::Worker(value)
    }
}

impl From<MlErr> for AggregationErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}
