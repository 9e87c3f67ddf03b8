//! Single-shot query profile
//!
//! Each named [`QueryCase`] runs once per environment on a fresh connection,
//! timing only statement execution and row draining. Profiles from two
//! environments are then paired by case name.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::compare::speedup;
use super::metrics::secs;
use super::sequential::probe;
use crate::driver::{Connection, Connector, Key};
use crate::error::BenchResult;

/// Column layout the default cases are written against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSchema {
    pub table: String,
    pub key_column: String,
    pub lookup_key: Key,
    pub text_column: String,
    pub text_pattern: String,
    pub text_limit: u32,
    pub date_column: String,
    pub date_from: String,
    pub date_to: String,
    pub date_limit: u32,
    pub group_column: String,
    pub group_limit: u32,
}

impl Default for ProfileSchema {
    fn default() -> Self {
        Self {
            table: "users".to_string(),
            key_column: "id".to_string(),
            lookup_key: 500_000,
            text_column: "email".to_string(),
            text_pattern: "%gmail.com%".to_string(),
            text_limit: 1000,
            date_column: "birth_date".to_string(),
            date_from: "1990-01-01".to_string(),
            date_to: "2000-01-01".to_string(),
            date_limit: 5000,
            group_column: "surname".to_string(),
            group_limit: 100,
        }
    }
}

/// One named statement with its bound parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCase {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl QueryCase {
    pub fn new(name: impl Into<String>, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            params,
        }
    }

    /// Point lookup, text search, date range and grouped aggregate.
    pub fn defaults(schema: &ProfileSchema) -> Vec<QueryCase> {
        let s = schema;
        vec![
            QueryCase::new(
                "lookup_by_key",
                format!("SELECT * FROM {} WHERE {} = ?1", s.table, s.key_column),
                vec![json!(s.lookup_key)],
            ),
            QueryCase::new(
                "text_search",
                format!(
                    "SELECT * FROM {} WHERE {} LIKE ?1 LIMIT {}",
                    s.table, s.text_column, s.text_limit
                ),
                vec![json!(s.text_pattern)],
            ),
            QueryCase::new(
                "date_range",
                format!(
                    "SELECT * FROM {} WHERE {} BETWEEN ?1 AND ?2 LIMIT {}",
                    s.table, s.date_column, s.date_limit
                ),
                vec![json!(s.date_from), json!(s.date_to)],
            ),
            QueryCase::new(
                "group_and_order",
                format!(
                    "SELECT {col}, COUNT(*) AS count FROM {} GROUP BY {col} ORDER BY count DESC LIMIT {}",
                    s.table,
                    s.group_limit,
                    col = s.group_column
                ),
                Vec::new(),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTiming {
    pub environment: String,
    pub query: String,
    #[serde(with = "secs")]
    pub duration: Duration,
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl QueryTiming {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Run every case once against `connector`.
///
/// An unreachable store fails the profile up front. A failing case is
/// recorded with its error and zero duration and the profile continues.
pub fn run_query_profile<C: Connector>(
    environment: &str,
    connector: &C,
    cases: &[QueryCase],
) -> BenchResult<Vec<QueryTiming>> {
    if cases.is_empty() {
        return Ok(Vec::new());
    }
    probe(connector)?;

    tracing::info!(environment, cases = cases.len(), "Starting query profile");

    let timings = cases
        .iter()
        .map(|case| {
            let (duration, outcome) = match connector.connect() {
                Ok(mut conn) => {
                    let start = Instant::now();
                    let outcome = conn.fetch_all(&case.sql, &case.params);
                    (start.elapsed(), outcome)
                }
                Err(e) => (Duration::ZERO, Err(e)),
            };

            let timing = match outcome {
                Ok(row_count) => QueryTiming {
                    environment: environment.to_string(),
                    query: case.name.clone(),
                    duration,
                    row_count,
                    error: None,
                    recorded_at: Utc::now(),
                },
                Err(e) => {
                    tracing::warn!(environment, query = %case.name, error = %e, "Query case failed");
                    QueryTiming {
                        environment: environment.to_string(),
                        query: case.name.clone(),
                        duration: Duration::ZERO,
                        row_count: 0,
                        error: Some(e.to_string()),
                        recorded_at: Utc::now(),
                    }
                }
            };

            tracing::debug!(
                environment,
                query = %timing.query,
                elapsed_ms = timing.duration.as_secs_f64() * 1000.0,
                rows = timing.row_count,
                "Query case finished"
            );
            timing
        })
        .collect();

    Ok(timings)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryProfileRow {
    pub query: String,
    #[serde(with = "secs")]
    pub duration_a: Duration,
    #[serde(with = "secs")]
    pub duration_b: Duration,
    /// `b / a`, `0.0` when `a` is zero
    pub improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryProfileComparison {
    pub rows: Vec<QueryProfileRow>,
    /// Mean of `b` over mean of `a`, across cases that succeeded in both
    pub overall: f64,
    /// Cases paired by name where either side failed
    pub failed: BTreeSet<String>,
    /// Case names present in only one profile
    pub unmatched: BTreeSet<String>,
}

impl QueryProfileComparison {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unmatched.is_empty()
    }
}

/// Pair two profiles by case name, preserving the order of `a`.
pub fn compare_query_profiles(a: &[QueryTiming], b: &[QueryTiming]) -> QueryProfileComparison {
    let by_name: BTreeMap<&str, &QueryTiming> =
        b.iter().map(|t| (t.query.as_str(), t)).collect();
    let a_names: BTreeSet<&str> = a.iter().map(|t| t.query.as_str()).collect();

    let mut rows = Vec::new();
    let mut failed = BTreeSet::new();
    let mut unmatched = BTreeSet::new();

    for timing_a in a {
        let Some(timing_b) = by_name.get(timing_a.query.as_str()) else {
            unmatched.insert(timing_a.query.clone());
            continue;
        };
        if timing_a.is_failed() || timing_b.is_failed() {
            failed.insert(timing_a.query.clone());
            continue;
        }
        rows.push(QueryProfileRow {
            query: timing_a.query.clone(),
            duration_a: timing_a.duration,
            duration_b: timing_b.duration,
            improvement: speedup(timing_b.duration, timing_a.duration),
        });
    }
    unmatched.extend(
        b.iter()
            .filter(|t| !a_names.contains(t.query.as_str()))
            .map(|t| t.query.clone()),
    );

    let overall = if rows.is_empty() {
        0.0
    } else {
        let sum_a: Duration = rows.iter().map(|r| r.duration_a).sum();
        let sum_b: Duration = rows.iter().map(|r| r.duration_b).sum();
        // Equal counts on both sides, so the ratio of sums is the ratio of means
        speedup(sum_b, sum_a)
    };

    if !unmatched.is_empty() || !failed.is_empty() {
        tracing::warn!(
            unmatched = ?unmatched,
            failed = ?failed,
            "Query profile comparison is incomplete"
        );
    }

    QueryProfileComparison {
        rows,
        overall,
        failed,
        unmatched,
    }
}
