use std::{fmt, io, path::PathBuf};

use aggregator::AggregationErr;
use machine_learning::MlErr;
use worker::WorkerErr;

/// The orchestrator module's result type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// All errors that can stop a simulation run.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before the first round.
    InvalidConfig(String),
    /// Failed to read or write a file.
    Io { path: PathBuf, source: io::Error },
    /// A saved model couldn't be written or understood.
    Checkpoint { path: PathBuf, reason: String },
    /// `run_round` was called after the last round.
    Finished,
    Worker(WorkerErr),
    Aggregation(AggregationErr),
    Ml(MlErr),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io { path, source } => write!(f, "io error on '{}': {source}", path.display()),
            Self::Checkpoint { path, reason } => {
                write!(f, "invalid checkpoint '{}': {reason}", path.display())
            }
            Self::Finished => write!(f, "every round of the run was already executed"),
            Self::Worker(e) => write!(f, "worker error: {e}"),
            Self::Aggregation(e) => write!(f, "aggregation error: {e}"),
            Self::Ml(e) => write!(f, "machine learning error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Worker(e) => Some(e),
            Self::Aggregation(e) => Some(e),
            Self::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WorkerErr> for OrchestratorError {
    fn from(e: WorkerErr) -> Self {
        Self::Worker(e)
    }
}

impl From<AggregationErr> for OrchestratorError {
    fn from(e: AggregationErr) -> Self {
        Self::Aggregation(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}
