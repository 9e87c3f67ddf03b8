use thiserror::Error;

use crate::bench::StrategyKind;
use crate::driver::DriverError;

#[derive(Error, Debug)]
pub enum BenchError {
    /// The store could not be reached at all. Aborts the run for that environment.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single-operation driver fault that escaped the per-lookup record.
    #[error("Driver error: {0}")]
    Driver(DriverError),

    #[error("Async runtime error: {0}")]
    Runtime(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Comparison errors
    #[error("Baseline strategy '{0}' has no record")]
    MissingBaseline(StrategyKind),

    #[error("More than one record for strategy '{0}'")]
    DuplicateStrategy(StrategyKind),

    #[error("Records span environments: expected '{expected}', found '{found}'")]
    MixedEnvironments { expected: String, found: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;

impl From<DriverError> for BenchError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Connection(msg) => BenchError::Connection(msg),
            DriverError::PoolClosed => BenchError::Connection(err.to_string()),
            DriverError::Query(_) | DriverError::Timeout(_) => BenchError::Driver(err),
        }
    }
}

impl serde::Serialize for BenchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_connectivity_faults_become_connection_errors() {
        assert!(matches!(
            BenchError::from(DriverError::Connection("refused".to_string())),
            BenchError::Connection(msg) if msg == "refused"
        ));
        assert!(matches!(
            BenchError::from(DriverError::PoolClosed),
            BenchError::Connection(_)
        ));
        assert!(matches!(
            BenchError::from(DriverError::Query("no such table".to_string())),
            BenchError::Driver(DriverError::Query(_))
        ));
        assert!(matches!(
            BenchError::from(DriverError::Timeout(Duration::from_millis(5))),
            BenchError::Driver(DriverError::Timeout(_))
        ));
    }
}
