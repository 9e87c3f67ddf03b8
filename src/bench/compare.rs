//! Comparison engine
//!
//! Speedup is measured within one environment against a baseline strategy.
//! The cross-environment ratio compares the same strategy between two
//! environments. Neither ever divides by a zero duration: the ratio is
//! reported as `0.0` instead.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

use super::metrics::{secs_vec, StrategyRunRecord};
use super::StrategyKind;
use crate::error::{BenchError, BenchResult};

/// `numerator / denominator`, or `0.0` when the denominator is zero.
pub fn speedup(numerator: Duration, denominator: Duration) -> f64 {
    if denominator.is_zero() {
        0.0
    } else {
        numerator.as_secs_f64() / denominator.as_secs_f64()
    }
}

/// Speedup of every strategy relative to `baseline`, within one environment.
///
/// Requires exactly one record per strategy and a single environment.
pub fn speedup_table(
    records: &[StrategyRunRecord],
    baseline: StrategyKind,
) -> BenchResult<BTreeMap<StrategyKind, f64>> {
    let by_strategy = index_unique(records)?;
    let base = by_strategy
        .get(&baseline)
        .ok_or(BenchError::MissingBaseline(baseline))?;

    Ok(by_strategy
        .iter()
        .map(|(kind, record)| (*kind, speedup(base.total_duration, record.total_duration)))
        .collect())
}

fn index_unique(
    records: &[StrategyRunRecord],
) -> BenchResult<BTreeMap<StrategyKind, &StrategyRunRecord>> {
    let mut by_strategy = BTreeMap::new();
    let mut environment: Option<&str> = None;

    for record in records {
        match environment {
            None => environment = Some(record.environment.as_str()),
            Some(expected) if expected != record.environment => {
                return Err(BenchError::MixedEnvironments {
                    expected: expected.to_string(),
                    found: record.environment.clone(),
                });
            }
            Some(_) => {}
        }
        if by_strategy.insert(record.strategy, record).is_some() {
            return Err(BenchError::DuplicateStrategy(record.strategy));
        }
    }

    Ok(by_strategy)
}

/// Per-strategy ratio between two environments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossEnvironmentRatios {
    /// `env_b total / env_a total` for strategies present in both
    pub ratios: BTreeMap<StrategyKind, f64>,
    /// Strategies present in only one of the two sets
    pub unmatched: BTreeSet<StrategyKind>,
}

impl CrossEnvironmentRatios {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Match records by strategy across two environments.
///
/// If a set holds more than one record for a strategy, the last one wins.
pub fn cross_environment_ratio(
    env_a: &[StrategyRunRecord],
    env_b: &[StrategyRunRecord],
) -> CrossEnvironmentRatios {
    let a = latest_by_strategy(env_a);
    let b = latest_by_strategy(env_b);

    let mut ratios = BTreeMap::new();
    let mut unmatched = BTreeSet::new();

    for (kind, record_a) in &a {
        match b.get(kind) {
            Some(record_b) => {
                ratios.insert(
                    *kind,
                    speedup(record_b.total_duration, record_a.total_duration),
                );
            }
            None => {
                unmatched.insert(*kind);
            }
        }
    }
    unmatched.extend(b.keys().filter(|kind| !a.contains_key(*kind)));

    if !unmatched.is_empty() {
        tracing::warn!(
            unmatched = ?unmatched,
            "Cross-environment comparison is incomplete"
        );
    }

    CrossEnvironmentRatios { ratios, unmatched }
}

fn latest_by_strategy(records: &[StrategyRunRecord]) -> BTreeMap<StrategyKind, &StrategyRunRecord> {
    records.iter().map(|r| (r.strategy, r)).collect()
}

/// One strategy's line in a [`ComparisonReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub test_type: StrategyKind,
    /// Total duration per environment, in report environment order
    #[serde(with = "secs_vec")]
    pub totals: Vec<Duration>,
    /// Speedup against the baseline per environment; `None` when that
    /// environment has no baseline record
    pub speedups: Vec<Option<f64>>,
    /// Second environment over first, present for two-environment reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

/// Table-shaped comparison for printing or charting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub environments: Vec<String>,
    pub baseline: StrategyKind,
    pub rows: Vec<ReportRow>,
    /// Strategies missing from at least one environment
    pub unmatched: BTreeSet<StrategyKind>,
}

impl ComparisonReport {
    /// Build a report over named record sets, one set per environment.
    pub fn build(
        environments: &[(&str, &[StrategyRunRecord])],
        baseline: StrategyKind,
    ) -> BenchResult<Self> {
        let mut indexed = Vec::with_capacity(environments.len());
        let mut speedups = Vec::with_capacity(environments.len());
        for (name, records) in environments {
            indexed.push(index_unique(records)?);
            speedups.push(match speedup_table(records, baseline) {
                Ok(table) => Some(table),
                Err(BenchError::MissingBaseline(_)) => {
                    tracing::warn!(
                        environment = *name,
                        baseline = %baseline,
                        "No baseline record"
                    );
                    None
                }
                Err(e) => return Err(e),
            });
        }

        let seen: BTreeSet<StrategyKind> = indexed
            .iter()
            .flat_map(|by_strategy| by_strategy.keys().copied())
            .collect();

        let mut rows = Vec::new();
        let mut unmatched = BTreeSet::new();
        for kind in seen {
            let totals: Option<Vec<Duration>> = indexed
                .iter()
                .map(|by_strategy| by_strategy.get(&kind).map(|r| r.total_duration))
                .collect();
            let Some(totals) = totals else {
                unmatched.insert(kind);
                continue;
            };

            let ratio = match totals.as_slice() {
                [a, b] => Some(speedup(*b, *a)),
                _ => None,
            };
            rows.push(ReportRow {
                test_type: kind,
                speedups: speedups
                    .iter()
                    .map(|table| table.as_ref().and_then(|t| t.get(&kind).copied()))
                    .collect(),
                totals,
                ratio,
            });
        }

        if !unmatched.is_empty() {
            tracing::warn!(
                unmatched = ?unmatched,
                "Report omits strategies missing from an environment"
            );
        }

        Ok(Self {
            environments: environments
                .iter()
                .map(|(name, _)| name.to_string())
                .collect(),
            baseline,
            rows,
            unmatched,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}
