use std::num::NonZeroUsize;

use log::{info, warn};
use machine_learning::Dataset;
use ndarray::Array2;
use rand::{Rng, seq::SliceRandom};

use super::balanced_shards;
use crate::{Result, WorkerErr, WorkerId};

/// How the training rows are assigned to the workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Balanced contiguous shards in dataset order.
    Contiguous,
    /// A seeded permutation of the rows cut into balanced shards.
    #[default]
    Shuffled,
    /// Each worker draws `⌈n / N⌉` rows uniformly with replacement.
    WithReplacement,
}

/// A mini-batch of a worker's private data.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub worker_id: WorkerId,
    pub x: Array2<f32>,
    pub y: Array2<f32>,
}

impl Batch {
    /// Returns the amount of samples in the batch.
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The private batch stream of every worker, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct Partition {
    streams: Vec<Vec<Batch>>,
}

impl Partition {
    /// Builds a partition out of already assigned streams, the `i`-th one belongs to worker `i`.
    pub fn from_streams(streams: Vec<Vec<Batch>>) -> Self {
        Self { streams }
    }

    /// Returns the amount of workers in the partition.
    pub fn num_workers(&self) -> usize {
        self.streams.len()
    }

    /// Returns the batches of the given worker, in training order.
    ///
    /// # Panics
    /// If `worker_id` is not a worker of this partition.
    pub fn stream(&self, worker_id: WorkerId) -> &[Batch] {
        &self.streams[worker_id]
    }

    pub fn streams(&self) -> &[Vec<Batch>] {
        &self.streams
    }

    /// Returns how many batches each worker has.
    pub fn batch_counts(&self) -> Vec<usize> {
        self.streams.iter().map(Vec::len).collect()
    }

    /// Returns how many samples each worker holds.
    pub fn sample_counts(&self) -> Vec<usize> {
        self.streams
            .iter()
            .map(|stream| stream.iter().map(Batch::len).sum())
            .collect()
    }

    /// Computes the amount of steps every participant takes per local epoch.
    ///
    /// It's the smallest batch count among the workers that are available and hold data, so that
    /// no worker runs past the end of its stream. Workers with empty streams never bound it.
    ///
    /// # Arguments
    /// * `mask` - The availability of every worker this round.
    ///
    /// # Returns
    /// The synchronized step count, `0` if no available worker has data.
    pub fn synchronized_steps(&self, mask: &[bool]) -> usize {
        self.streams
            .iter()
            .zip(mask)
            .filter(|(stream, available)| **available && !stream.is_empty())
            .map(|(stream, _)| stream.len())
            .min()
            .unwrap_or(0)
    }
}

/// Assigns the rows of `dataset` to `num_workers` workers and cuts every share in mini-batches.
///
/// # Arguments
/// * `dataset` - The training samples.
/// * `num_workers` - The amount of workers in the federation.
/// * `batch_size` - The maximum amount of rows per batch, the last batch of a worker may be smaller.
/// * `strategy` - How to assign rows to workers.
/// * `rng` - The source of randomness for the shuffled and bootstrap strategies.
///
/// # Returns
/// The partition or an error if any of the arguments is empty.
pub fn partition<R: Rng + ?Sized>(
    dataset: &Dataset,
    num_workers: usize,
    batch_size: usize,
    strategy: PartitionStrategy,
    rng: &mut R,
) -> Result<Partition> {
    if num_workers == 0 {
        return Err(WorkerErr::InvalidPartition("there must be at least one worker"));
    }

    if dataset.is_empty() {
        return Err(WorkerErr::InvalidPartition("the training dataset is empty"));
    }

    let batch_size = NonZeroUsize::new(batch_size)
        .ok_or(WorkerErr::InvalidPartition("batch_size must be greater than 0"))?;

    let n = dataset.len();
    let shares: Vec<Vec<usize>> = match strategy {
        PartitionStrategy::Contiguous => balanced_shards(n, num_workers)
            .map(|shard| shard.collect())
            .collect(),
        PartitionStrategy::Shuffled => {
            let mut rows: Vec<_> = (0..n).collect();
            rows.shuffle(rng);

            balanced_shards(n, num_workers)
                .map(|shard| rows[shard].to_vec())
                .collect()
        }
        PartitionStrategy::WithReplacement => {
            let per_worker = n.div_ceil(num_workers);

            (0..num_workers)
                .map(|_| (0..per_worker).map(|_| rng.random_range(0..n)).collect())
                .collect()
        }
    };

    let streams: Vec<Vec<Batch>> = shares
        .iter()
        .enumerate()
        .map(|(worker_id, rows)| {
            let share = dataset.select(rows);

            share
                .batches(batch_size)
                .map(|(x, y)| Batch {
                    worker_id,
                    x: x.to_owned(),
                    y: y.to_owned(),
                })
                .collect()
        })
        .collect();

    for (worker_id, stream) in streams.iter().enumerate() {
        if stream.is_empty() {
            warn!(worker_id = worker_id; "worker has no training data and will never contribute");
        }
    }

    let partition = Partition { streams };
    info!(
        "Partitioned {n} samples among {num_workers} workers, batches per worker: {:?}",
        partition.batch_counts()
    );

    Ok(partition)
}
