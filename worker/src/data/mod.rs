mod partition;
mod shard;

pub use partition::{Batch, Partition, PartitionStrategy, partition};
pub use shard::balanced_shards;
