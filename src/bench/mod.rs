//! Concurrency benchmark core
//!
//! A [`Workload`] of lookup keys is executed by one of three
//! [`ExecutionStrategy`] implementations. Every strategy returns its timed
//! results in submission order, whatever order the lookups completed in, and
//! [`metrics::aggregate`] folds them into a [`StrategyRunRecord`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::Key;
use crate::error::{BenchError, BenchResult};

pub mod compare;
pub mod cooperative;
pub mod metrics;
pub mod pooled;
pub mod profile;
pub mod sequential;
pub mod timed;

pub use compare::{
    cross_environment_ratio, speedup, speedup_table, ComparisonReport, CrossEnvironmentRatios,
    ReportRow,
};
pub use cooperative::CooperativeAsync;
pub use metrics::{aggregate, StrategyRunRecord};
pub use pooled::PooledThreads;
pub use profile::{
    compare_query_profiles, run_query_profile, ProfileSchema, QueryCase, QueryProfileComparison,
    QueryProfileRow, QueryTiming,
};
pub use sequential::Sequential;
pub use timed::{LookupStatus, Outcome, TimedResult};

/// Ordered lookup keys driving one comparison run. Cheap to clone, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    keys: Arc<[Key]>,
}

impl Workload {
    pub fn new(keys: Vec<Key>) -> Self {
        Self { keys: keys.into() }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        self.keys.iter().copied()
    }
}

impl From<Vec<Key>> for Workload {
    fn from(keys: Vec<Key>) -> Self {
        Self::new(keys)
    }
}

/// Execution strategy, also the "test type" records are matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sequential,
    PooledThreads,
    CooperativeAsync,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Sequential,
        StrategyKind::PooledThreads,
        StrategyKind::CooperativeAsync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sequential => "sequential",
            StrategyKind::PooledThreads => "pooled_threads",
            StrategyKind::CooperativeAsync => "cooperative_async",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BenchError::Config(format!("unknown strategy '{}'", s)))
    }
}

/// Raw output of one strategy execution, before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    /// One entry per workload key, in submission order
    pub results: Vec<TimedResult>,
    /// Wall clock from first submission to last completion
    pub total: Duration,
}

impl StrategyOutput {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total: Duration::ZERO,
        }
    }
}

/// One way of executing a workload.
///
/// Implementations are stateless across runs: executing the same workload
/// twice against the same store yields comparable, independent measurements.
pub trait ExecutionStrategy {
    fn kind(&self) -> StrategyKind;

    /// Pool size for concurrent strategies, `None` for sequential.
    fn concurrency(&self) -> Option<usize>;

    /// Execute every lookup of `workload`.
    ///
    /// Returns `BenchError::Connection` when the store cannot be reached at
    /// all. Individual lookup faults are recorded in the output instead.
    fn execute(&self, workload: &Workload) -> BenchResult<StrategyOutput>;

    fn run(&self, environment: &str, workload: &Workload) -> BenchResult<StrategyRunRecord> {
        let output = self.execute(workload)?;
        Ok(aggregate(
            self.kind(),
            environment,
            &output.results,
            output.total,
            self.concurrency(),
        ))
    }
}

pub(crate) fn validate_pool_size(pool_size: usize) -> BenchResult<()> {
    if pool_size == 0 {
        return Err(BenchError::InvalidParameter(
            "pool size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Place results delivered in completion order back into submission order.
///
/// Every index must be delivered exactly once; a slot left empty is recorded
/// as a failed lookup rather than shifting later results.
pub(crate) fn into_submission_order(
    workload: &Workload,
    completed: impl IntoIterator<Item = (usize, TimedResult)>,
) -> Vec<TimedResult> {
    let mut slots: Vec<Option<TimedResult>> = (0..workload.len()).map(|_| None).collect();
    for (index, result) in completed {
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .zip(workload.iter())
        .map(|(slot, key)| {
            slot.unwrap_or_else(|| TimedResult::failed(key, "lookup never reported a result"))
        })
        .collect()
}
