//! Harness runner
//!
//! Drives every strategy over one workload for each environment in turn and
//! persists the resulting records.

use std::thread;

use crate::bench::{
    CooperativeAsync, ExecutionStrategy, PooledThreads, Sequential, StrategyRunRecord, Workload,
};
use crate::config::RunConfig;
use crate::driver::{AsyncConnect, Connector};
use crate::error::{BenchError, BenchResult};
use crate::results::ResultStore;

/// Outcome of one environment within a multi-environment run
#[derive(Debug)]
pub struct EnvironmentRun {
    pub environment: String,
    pub result: BenchResult<Vec<StrategyRunRecord>>,
}

pub struct EnvironmentRunner<'a, S: ResultStore> {
    settings: RunConfig,
    store: &'a S,
}

impl<'a, S: ResultStore> EnvironmentRunner<'a, S> {
    pub fn new(settings: RunConfig, store: &'a S) -> Self {
        Self { settings, store }
    }

    pub fn settings(&self) -> &RunConfig {
        &self.settings
    }

    /// Sequential, then thread pool, then cooperative async, pausing between
    /// strategies. The records replace the environment's stored set only
    /// once all three have finished.
    ///
    /// A connection failure stops this environment and leaves the store
    /// untouched, so a stored set never mixes records from different runs.
    pub fn run<C>(
        &self,
        environment: &str,
        connector: C,
        workload: &Workload,
    ) -> BenchResult<Vec<StrategyRunRecord>>
    where
        C: Connector + AsyncConnect + Clone,
    {
        let strategies: Vec<Box<dyn ExecutionStrategy>> = vec![
            Box::new(Sequential::new(connector.clone())),
            Box::new(PooledThreads::new(connector.clone(), self.settings.pool_size)),
            Box::new(
                CooperativeAsync::new(connector, self.settings.pool_size)
                    .with_min_size(self.settings.async_min_pool)
                    .with_op_timeout(self.settings.op_timeout()),
            ),
        ];

        tracing::info!(
            environment,
            lookups = workload.len(),
            pool_size = self.settings.pool_size,
            "Running environment"
        );

        let mut records = Vec::with_capacity(strategies.len());
        for (i, strategy) in strategies.iter().enumerate() {
            if i > 0 {
                thread::sleep(self.settings.pause_between_strategies());
            }
            records.push(strategy.run(environment, workload)?);
        }

        self.store.replace(environment, &records)?;
        Ok(records)
    }

    /// Run each environment in order. A connection failure skips that
    /// environment and the rest still run.
    pub fn run_all<C, I>(&self, environments: I, workload: &Workload) -> Vec<EnvironmentRun>
    where
        C: Connector + AsyncConnect + Clone,
        I: IntoIterator<Item = (String, C)>,
    {
        let mut runs = Vec::new();
        for (i, (environment, connector)) in environments.into_iter().enumerate() {
            if i > 0 {
                thread::sleep(self.settings.pause_between_environments());
            }

            let result = self.run(&environment, connector, workload);
            match &result {
                Ok(records) => {
                    tracing::info!(environment = %environment, records = records.len(), "Environment complete");
                }
                Err(BenchError::Connection(msg)) => {
                    tracing::error!(environment = %environment, error = %msg, "Environment unreachable, skipping");
                }
                Err(e) => {
                    tracing::error!(environment = %environment, error = %e, "Environment run failed");
                }
            }
            runs.push(EnvironmentRun {
                environment,
                result,
            });
        }
        runs
    }
}
