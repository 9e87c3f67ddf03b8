use std::time::Instant;

use super::timed::{timed_lookup, TimedResult};
use super::{ExecutionStrategy, StrategyKind, StrategyOutput, Workload};
use crate::driver::{Connector, Key};
use crate::error::BenchResult;

/// Baseline strategy: one lookup at a time, in workload order.
pub struct Sequential<C: Connector> {
    connector: C,
}

impl<C: Connector> Sequential<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: Connector> ExecutionStrategy for Sequential<C> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    fn concurrency(&self) -> Option<usize> {
        None
    }

    fn execute(&self, workload: &Workload) -> BenchResult<StrategyOutput> {
        if workload.is_empty() {
            return Ok(StrategyOutput::empty());
        }
        probe(&self.connector)?;

        tracing::info!(lookups = workload.len(), "Starting sequential run");

        let mut results = Vec::with_capacity(workload.len());
        let start = Instant::now();
        for (index, key) in workload.iter().enumerate() {
            let result = lookup_with_fresh_connection(&self.connector, key);
            result.log(StrategyKind::Sequential.as_str(), index);
            results.push(result);
        }
        let total = start.elapsed();

        Ok(StrategyOutput { results, total })
    }
}

/// Open and drop one connection so an unreachable store fails the whole run
/// up front instead of producing a record of failed lookups.
pub(crate) fn probe<C: Connector>(connector: &C) -> BenchResult<()> {
    connector.connect()?;
    Ok(())
}

/// One connection per lookup; connect time is outside the measured span.
pub(crate) fn lookup_with_fresh_connection<C: Connector>(connector: &C, key: Key) -> TimedResult {
    match connector.connect() {
        Ok(mut conn) => timed_lookup(&mut conn, key),
        Err(e) => TimedResult::failed(key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::LookupStatus;
    use crate::driver::MemoryStore;
    use crate::error::BenchError;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_sequential_preserves_order() {
        let store = MemoryStore::builder()
            .row(1, json!({"id": 1}))
            .row(3, json!({"id": 3}))
            .latency(Duration::from_millis(2))
            .build();
        let strategy = Sequential::new(store.clone());

        let output = strategy.execute(&Workload::new(vec![3, 2, 1])).unwrap();
        let keys: Vec<_> = output.results.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![3, 2, 1]);
        assert_eq!(output.results[1].status(), LookupStatus::NotFound);
        assert!(output.total >= Duration::from_millis(6));
        // probe plus one connection per lookup
        assert_eq!(store.connections_opened(), 4);
        assert_eq!(store.peak_in_flight(), 1);
    }

    #[test]
    fn test_sequential_unreachable_store() {
        let store = MemoryStore::builder().unreachable().build();
        let result = Sequential::new(store).execute(&Workload::new(vec![1]));
        assert!(matches!(result, Err(BenchError::Connection(_))));
    }

    #[test]
    fn test_sequential_empty_workload() {
        let store = MemoryStore::builder().unreachable().build();
        let output = Sequential::new(store).execute(&Workload::new(vec![])).unwrap();
        assert!(output.results.is_empty());
        assert_eq!(output.total, Duration::ZERO);
    }
}
