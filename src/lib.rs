pub mod bench;
pub mod config;
pub mod driver;
pub mod error;
pub mod results;
pub mod runner;

pub use bench::{
    aggregate, cross_environment_ratio, speedup, speedup_table, ComparisonReport,
    CooperativeAsync, ExecutionStrategy, PooledThreads, Sequential, StrategyKind,
    StrategyRunRecord, Workload,
};
pub use config::BenchConfig;
pub use error::{BenchError, BenchResult};
pub use results::{JsonFileStore, ResultStore};
pub use runner::{EnvironmentRun, EnvironmentRunner};
