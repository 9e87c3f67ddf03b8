//! Cooperative async strategy
//!
//! All lookups are polled from a single task through a `FuturesUnordered`
//! set, so concurrency comes from suspension at I/O boundaries (pool acquire,
//! query execution) rather than from parallel threads. The bounded
//! [`ConnectionPool`] is the only throttle: at most `pool_size` lookups hold a
//! connection at any moment.
//!
//! When driven through [`ExecutionStrategy::execute`] the strategy builds its
//! own current-thread runtime, which keeps the whole run on one OS thread.

use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};

use super::timed::{timed_lookup_async, TimedResult};
use super::{
    into_submission_order, validate_pool_size, ExecutionStrategy, StrategyKind, StrategyOutput,
    Workload,
};
use crate::driver::{AsyncConnect, ConnectionPool, DriverError, Key};
use crate::error::{BenchError, BenchResult};

pub struct CooperativeAsync<A: AsyncConnect + Clone> {
    connector: A,
    pool_size: usize,
    min_size: usize,
    op_timeout: Option<Duration>,
}

impl<A: AsyncConnect + Clone> CooperativeAsync<A> {
    pub fn new(connector: A, pool_size: usize) -> Self {
        Self {
            connector,
            pool_size,
            min_size: 1,
            op_timeout: None,
        }
    }

    /// Connections opened eagerly when the pool is created. At least one is
    /// always opened so an unreachable store fails the run before any lookup.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Bound each lookup once it holds a connection. Waiting for a pool slot
    /// is not counted. A lookup that overruns is recorded as failed and its
    /// connection is discarded rather than reused.
    pub fn with_op_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub async fn execute_async(&self, workload: &Workload) -> BenchResult<StrategyOutput> {
        validate_pool_size(self.pool_size)?;
        if workload.is_empty() {
            return Ok(StrategyOutput::empty());
        }

        let pool =
            ConnectionPool::create(self.connector.clone(), self.min_size.max(1), self.pool_size)
                .await?;
        let pool = CloseOnDrop(pool);

        tracing::info!(
            lookups = workload.len(),
            pool_size = self.pool_size,
            "Starting cooperative async run"
        );

        let start = Instant::now();
        let mut pending: FuturesUnordered<_> = workload
            .iter()
            .enumerate()
            .map(|(index, key)| {
                let pool = &pool.0;
                async move { (index, self.lookup(pool, key).await) }
            })
            .collect();

        let mut completed = Vec::with_capacity(workload.len());
        while let Some((index, result)) = pending.next().await {
            result.log(StrategyKind::CooperativeAsync.as_str(), index);
            completed.push((index, result));
        }
        let total = start.elapsed();

        drop(pending);
        pool.0.close();

        Ok(StrategyOutput {
            results: into_submission_order(workload, completed),
            total,
        })
    }

    async fn lookup(&self, pool: &ConnectionPool<A>, key: Key) -> TimedResult {
        let mut conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return TimedResult::failed(key, e),
        };

        let Some(limit) = self.op_timeout else {
            return timed_lookup_async(&mut *conn, key).await;
        };

        let outcome = tokio::time::timeout(limit, timed_lookup_async(&mut *conn, key)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                // The abandoned statement may still hold the connection busy
                conn.discard();
                TimedResult::failed(key, DriverError::Timeout(limit))
            }
        }
    }
}

/// Closes the pool on every exit path, including unwinding and cancellation.
struct CloseOnDrop<A: AsyncConnect>(ConnectionPool<A>);

impl<A: AsyncConnect> Drop for CloseOnDrop<A> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl<A: AsyncConnect + Clone> ExecutionStrategy for CooperativeAsync<A> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CooperativeAsync
    }

    fn concurrency(&self) -> Option<usize> {
        Some(self.pool_size)
    }

    /// Blocking entry point. Use [`CooperativeAsync::execute_async`] from
    /// inside an existing runtime.
    fn execute(&self, workload: &Workload) -> BenchResult<StrategyOutput> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BenchError::Runtime(
                "cannot block inside an async runtime, use execute_async".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BenchError::Runtime(format!("failed to build runtime: {}", e)))?;

        runtime.block_on(self.execute_async(workload))
    }
}
