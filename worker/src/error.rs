use std::{error::Error, fmt};

use machine_learning::MlErr;

use crate::WorkerId;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Local training failures.
#[derive(Debug)]
pub enum WorkerErr {
    /// The loss or a parameter stopped being finite.
    Diverged {
        worker_id: WorkerId,
        step: u64,
        loss: f32,
    },
    InvalidPartition(&'static str),
    ParamsLengthMismatch {
        worker_id: WorkerId,
        got: usize,
        expected: usize,
    },
    Ml(MlErr),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Diverged {
                worker_id,
                step,
                loss,
            } => write!(
                f,
                "worker {worker_id} diverged at step {step} with a loss of {loss}"
            ),
            WorkerErr::InvalidPartition(msg) => write!(f, "invalid partition: {msg}"),
            WorkerErr::ParamsLengthMismatch {
                worker_id,
                got,
                expected,
            } => write!(
                f,
                "params length mismatch for worker {worker_id}: got {got}, expected {expected}"
            ),
            WorkerErr::Ml(e) => write!(f, "machine learning error: {e}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}
