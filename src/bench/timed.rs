//! Timed lookup
//!
//! The clock wraps the driver call only. Connecting, pool acquisition and
//! result bookkeeping happen outside the measured span.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::driver::{AsyncConnection, Connection, Key, Row};

/// What a single lookup produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Found(Row),
    /// No row for the key. A valid measurement, not a failure.
    NotFound,
    /// The lookup could not be executed; excluded from mean latency.
    Failed(String),
}

/// Serializable summary of an [`Outcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Found,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedResult {
    pub key: Key,
    pub duration: Duration,
    pub outcome: Outcome,
}

impl TimedResult {
    pub fn new(key: Key, duration: Duration, outcome: Outcome) -> Self {
        Self {
            key,
            duration,
            outcome,
        }
    }

    /// Failed lookups carry a zero duration.
    pub fn failed(key: Key, reason: impl fmt::Display) -> Self {
        Self {
            key,
            duration: Duration::ZERO,
            outcome: Outcome::Failed(reason.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn status(&self) -> LookupStatus {
        match self.outcome {
            Outcome::Found(_) => LookupStatus::Found,
            Outcome::NotFound => LookupStatus::NotFound,
            Outcome::Failed(_) => LookupStatus::Failed,
        }
    }

    pub fn row(&self) -> Option<&Row> {
        match &self.outcome {
            Outcome::Found(row) => Some(row),
            _ => None,
        }
    }

    pub(crate) fn log(&self, strategy: &str, index: usize) {
        match &self.outcome {
            Outcome::Failed(reason) => tracing::warn!(
                strategy,
                index,
                key = self.key,
                "Lookup failed: {}",
                reason
            ),
            _ => tracing::debug!(
                strategy,
                index,
                key = self.key,
                elapsed_ms = self.duration.as_secs_f64() * 1000.0,
                found = self.row().is_some(),
                "Lookup complete"
            ),
        }
    }
}

pub fn timed_lookup<C: Connection>(conn: &mut C, key: Key) -> TimedResult {
    let start = Instant::now();
    let result = conn.query_by_key(key);
    let elapsed = start.elapsed();
    into_timed(key, elapsed, result)
}

pub async fn timed_lookup_async<C: AsyncConnection>(conn: &mut C, key: Key) -> TimedResult {
    let start = Instant::now();
    let result = conn.query_by_key(key).await;
    let elapsed = start.elapsed();
    into_timed(key, elapsed, result)
}

fn into_timed(
    key: Key,
    elapsed: Duration,
    result: crate::driver::DriverResult<Option<Row>>,
) -> TimedResult {
    match result {
        Ok(Some(row)) => TimedResult::new(key, elapsed, Outcome::Found(row)),
        Ok(None) => TimedResult::new(key, elapsed, Outcome::NotFound),
        Err(e) => TimedResult::failed(key, e),
    }
}
