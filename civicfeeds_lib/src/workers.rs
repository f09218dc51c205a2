//! Partitioned worker pool for long key lists.
//!
//! Keys are dealt round-robin (index modulo N) into disjoint partitions. Each
//! worker owns its partition and whatever session it opens; nothing mutable is
//! shared, and partial results are concatenated in worker order afterwards.

use std::future::Future;

use futures::future::join_all;

/// Deals `items` into at most `workers` partitions: item `i` goes to partition `i % n`.
///
/// The partition count is clamped to `1..=items.len()` so no worker starts empty.
pub fn partition_round_robin<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let n = workers.clamp(1, items.len());
    let mut partitions: Vec<Vec<T>> = (0..n).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        partitions[i % n].push(item);
    }
    partitions
}

/// Runs `work(worker_index, partition)` for every partition concurrently and
/// collects the results in worker order.
///
/// All workers run to completion; the first error in worker order is returned.
pub async fn run_partitioned<T, R, E, F, Fut>(
    items: Vec<T>,
    workers: usize,
    work: F,
) -> Result<Vec<R>, E>
where
    F: Fn(usize, Vec<T>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let partitions = partition_round_robin(items, workers);
    tracing::debug!("Dispatching {} partitions", partitions.len());
    let results = join_all(
        partitions
            .into_iter()
            .enumerate()
            .map(|(index, partition)| work(index, partition)),
    )
    .await;
    results.into_iter().collect()
}
