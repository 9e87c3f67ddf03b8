use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timed::{LookupStatus, TimedResult};
use super::StrategyKind;
use crate::driver::Key;

/// Aggregated outcome of one strategy executed once against one environment.
///
/// `keys`, `per_key_durations` and `outcomes` are parallel vectors in
/// workload submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRunRecord {
    pub environment: String,
    #[serde(rename = "test_type")]
    pub strategy: StrategyKind,
    #[serde(with = "secs")]
    pub total_duration: Duration,
    /// Mean over lookups that did not fail; zero if every lookup failed
    #[serde(with = "secs")]
    pub mean_duration: Duration,
    pub query_count: usize,
    pub failed_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    pub keys: Vec<Key>,
    #[serde(with = "secs_vec")]
    pub per_key_durations: Vec<Duration>,
    pub outcomes: Vec<LookupStatus>,
    pub recorded_at: DateTime<Utc>,
}

impl StrategyRunRecord {
    /// Every lookup failed. Reported with a zero mean rather than as an error.
    pub fn is_degenerate(&self) -> bool {
        self.query_count > 0 && self.failed_count == self.query_count
    }

    pub fn found_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|s| **s == LookupStatus::Found)
            .count()
    }

    pub fn not_found_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|s| **s == LookupStatus::NotFound)
            .count()
    }
}

/// Fold per-lookup results (already in submission order) into a run record.
pub fn aggregate(
    strategy: StrategyKind,
    environment: &str,
    results: &[TimedResult],
    total: Duration,
    concurrency: Option<usize>,
) -> StrategyRunRecord {
    let succeeded: Vec<Duration> = results
        .iter()
        .filter(|r| !r.is_failed())
        .map(|r| r.duration)
        .collect();
    let failed_count = results.len() - succeeded.len();

    let mean_duration = if succeeded.is_empty() {
        Duration::ZERO
    } else {
        let sum: Duration = succeeded.iter().sum();
        match u32::try_from(succeeded.len()) {
            Ok(n) => sum / n,
            Err(_) => Duration::from_secs_f64(sum.as_secs_f64() / succeeded.len() as f64),
        }
    };

    if !results.is_empty() && succeeded.is_empty() {
        tracing::warn!(
            environment,
            strategy = %strategy,
            lookups = results.len(),
            "Every lookup failed, mean reported as zero"
        );
    }

    tracing::info!(
        environment,
        strategy = %strategy,
        total_ms = total.as_secs_f64() * 1000.0,
        mean_ms = mean_duration.as_secs_f64() * 1000.0,
        failed = failed_count,
        "Run complete"
    );

    StrategyRunRecord {
        environment: environment.to_string(),
        strategy,
        total_duration: total,
        mean_duration,
        query_count: results.len(),
        failed_count,
        concurrency,
        keys: results.iter().map(|r| r.key).collect(),
        per_key_durations: results.iter().map(|r| r.duration).collect(),
        outcomes: results.iter().map(|r| r.status()).collect(),
        recorded_at: Utc::now(),
    }
}

/// Durations as fractional seconds
pub(crate) mod secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(raw).map_err(de::Error::custom)
    }
}

pub(crate) mod secs_vec {
    use serde::ser::SerializeSeq;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.as_secs_f64())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Duration>, D::Error> {
        Vec::<f64>::deserialize(deserializer)?
            .into_iter()
            .map(|raw| Duration::try_from_secs_f64(raw).map_err(de::Error::custom))
            .collect()
    }
}
