use std::ops::Range;

/// Cuts `[0, total)` into `num_workers` contiguous ranges, yielded in worker id order.
///
/// The ranges are disjoint and cover every index. Their lengths differ by at most one, the
/// longer ones going to the lowest worker ids. No range is yielded when there are no workers.
pub fn balanced_shards(total: usize, num_workers: usize) -> impl Iterator<Item = Range<usize>> {
    let base = total.checked_div(num_workers).unwrap_or(0);
    let rem = total.checked_rem(num_workers).unwrap_or(0);
    let mut start = 0;

    (0..num_workers).map(move |worker_id| {
        let len = base + usize::from(worker_id < rem);
        let shard = start..start + len;
        start += len;
        shard
    })
}
