//! Thread-pool strategy
//!
//! Lookups are submitted to a rayon pool of `pool_size` OS threads. Each task
//! opens its own connection, so no connection is ever shared between
//! concurrent lookups. Workers report `(index, result)` over a channel as they
//! finish; the index captured at submission is what puts each result back in
//! its workload slot.

use std::sync::mpsc;
use std::time::Instant;

use super::sequential::{lookup_with_fresh_connection, probe};
use super::timed::TimedResult;
use super::{
    into_submission_order, validate_pool_size, ExecutionStrategy, StrategyKind, StrategyOutput,
    Workload,
};
use crate::driver::Connector;
use crate::error::{BenchError, BenchResult};

pub struct PooledThreads<C: Connector> {
    connector: C,
    pool_size: usize,
}

impl<C: Connector> PooledThreads<C> {
    pub fn new(connector: C, pool_size: usize) -> Self {
        Self {
            connector,
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl<C: Connector> ExecutionStrategy for PooledThreads<C> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PooledThreads
    }

    fn concurrency(&self) -> Option<usize> {
        Some(self.pool_size)
    }

    fn execute(&self, workload: &Workload) -> BenchResult<StrategyOutput> {
        validate_pool_size(self.pool_size)?;
        if workload.is_empty() {
            return Ok(StrategyOutput::empty());
        }
        probe(&self.connector)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .thread_name(|i| format!("lookup-worker-{}", i))
            .build()
            .map_err(|e| BenchError::Runtime(format!("failed to build thread pool: {}", e)))?;

        tracing::info!(
            lookups = workload.len(),
            pool_size = self.pool_size,
            "Starting thread-pool run"
        );

        let (tx, rx) = mpsc::channel::<(usize, TimedResult)>();
        let connector = &self.connector;

        let start = Instant::now();
        pool.scope(|scope| {
            for (index, key) in workload.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let result = lookup_with_fresh_connection(connector, key);
                    // Receiver outlives the scope
                    let _ = tx.send((index, result));
                });
            }
        });
        let total = start.elapsed();
        drop(tx);

        let completed = rx.into_iter().enumerate().map(|(position, (index, result))| {
            tracing::trace!(completed = position + 1, index, "Worker reported");
            result.log(StrategyKind::PooledThreads.as_str(), index);
            (index, result)
        });
        let results = into_submission_order(workload, completed);

        Ok(StrategyOutput { results, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::LookupStatus;
    use crate::driver::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_results_in_submission_order_despite_completion_order() {
        // First key is slowest, so it completes last
        let store = MemoryStore::builder()
            .rows((1..=4).map(|k| (k, json!({"id": k}))))
            .key_latency(1, Duration::from_millis(60))
            .latency(Duration::from_millis(5))
            .build();
        let strategy = PooledThreads::new(store, 4);

        let output = strategy.execute(&Workload::new(vec![1, 2, 3, 4])).unwrap();
        let keys: Vec<_> = output.results.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
        assert!(output.results[0].duration >= Duration::from_millis(60));
        assert!(output.results[1].duration < Duration::from_millis(60));
    }

    #[test]
    fn test_pool_size_bounds_concurrency() {
        let store = MemoryStore::builder()
            .latency(Duration::from_millis(10))
            .build();
        let strategy = PooledThreads::new(store.clone(), 2);

        let output = strategy.execute(&Workload::new((0..8).collect::<Vec<i64>>())).unwrap();
        assert_eq!(output.results.len(), 8);
        assert!(store.peak_in_flight() <= 2);
        // probe plus one connection per lookup
        assert_eq!(store.connections_opened(), 9);
    }

    #[test]
    fn test_failed_lookup_does_not_abort_siblings() {
        let store = MemoryStore::builder()
            .row(1, json!({"id": 1}))
            .row(3, json!({"id": 3}))
            .failing_key(2)
            .build();
        let output = PooledThreads::new(store, 3)
            .execute(&Workload::new(vec![1, 2, 3]))
            .unwrap();

        let statuses: Vec<_> = output.results.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![LookupStatus::Found, LookupStatus::Failed, LookupStatus::Found]
        );
        assert_eq!(output.results[1].duration, Duration::ZERO);
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let store = MemoryStore::builder().build();
        let result = PooledThreads::new(store, 0).execute(&Workload::new(vec![1]));
        assert!(matches!(result, Err(BenchError::InvalidParameter(_))));
    }

    #[test]
    fn test_total_reflects_overlap() {
        let store = MemoryStore::builder()
            .latency(Duration::from_millis(40))
            .build();
        let output = PooledThreads::new(store, 4)
            .execute(&Workload::new(vec![1, 2, 3, 4]))
            .unwrap();

        let summed: Duration = output.results.iter().map(|r| r.duration).sum();
        assert!(output.total < summed);
    }
}
