//! Speedup, cross-environment ratio and report building

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::{memory_store, record, ten_keys};
use lookup_bench::config::RunConfig;
use lookup_bench::{
    cross_environment_ratio, speedup, speedup_table, BenchError, ComparisonReport,
    EnvironmentRunner, JsonFileStore, StrategyKind,
};

#[test]
fn test_speedup_guards_zero_denominator() {
    assert_eq!(speedup(Duration::from_secs(2), Duration::ZERO), 0.0);
    assert_eq!(speedup(Duration::ZERO, Duration::from_secs(1)), 0.0);
    assert_eq!(speedup(Duration::from_secs(3), Duration::from_secs(2)), 1.5);
}

#[test]
fn test_speedup_table_zero_total_strategy() {
    let records = vec![
        record("A", StrategyKind::Sequential, 500),
        record("A", StrategyKind::PooledThreads, 0),
        record("A", StrategyKind::CooperativeAsync, 250),
    ];
    let table = speedup_table(&records, StrategyKind::Sequential).unwrap();
    assert_eq!(table[&StrategyKind::PooledThreads], 0.0);
    assert_eq!(table[&StrategyKind::CooperativeAsync], 2.0);
}

#[test]
fn test_speedup_table_against_other_baseline() {
    let records = vec![
        record("A", StrategyKind::Sequential, 600),
        record("A", StrategyKind::PooledThreads, 200),
    ];
    let table = speedup_table(&records, StrategyKind::PooledThreads).unwrap();
    assert_eq!(table[&StrategyKind::PooledThreads], 1.0);
    assert!((table[&StrategyKind::Sequential] - 1.0 / 3.0).abs() < 1e-9);

    assert!(matches!(
        speedup_table(&records, StrategyKind::CooperativeAsync),
        Err(BenchError::MissingBaseline(StrategyKind::CooperativeAsync))
    ));
}

#[test]
fn test_cross_environment_reports_async_unmatched() {
    let a = vec![
        record("A", StrategyKind::Sequential, 100),
        record("A", StrategyKind::PooledThreads, 40),
    ];
    let b = vec![
        record("B", StrategyKind::Sequential, 250),
        record("B", StrategyKind::PooledThreads, 80),
        record("B", StrategyKind::CooperativeAsync, 60),
    ];

    let result = cross_environment_ratio(&a, &b);
    let matched: BTreeSet<_> = result.ratios.keys().copied().collect();
    assert_eq!(
        matched,
        BTreeSet::from([StrategyKind::Sequential, StrategyKind::PooledThreads])
    );
    assert!((result.ratios[&StrategyKind::Sequential] - 2.5).abs() < 1e-9);
    assert_eq!(
        result.unmatched,
        BTreeSet::from([StrategyKind::CooperativeAsync])
    );

    // Unmatched is symmetric
    let reversed = cross_environment_ratio(&b, &a);
    assert_eq!(reversed.unmatched, result.unmatched);
    assert!((reversed.ratios[&StrategyKind::Sequential] - 0.4).abs() < 1e-9);
}

#[test]
fn test_report_over_three_environments_has_no_ratio() {
    let a = vec![record("A", StrategyKind::Sequential, 100)];
    let b = vec![record("B", StrategyKind::Sequential, 200)];
    let c = vec![record("C", StrategyKind::Sequential, 300)];

    let report = ComparisonReport::build(
        &[("A", a.as_slice()), ("B", b.as_slice()), ("C", c.as_slice())],
        StrategyKind::Sequential,
    )
    .unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].totals.len(), 3);
    assert_eq!(report.rows[0].ratio, None);
    assert_eq!(report.rows[0].speedups, vec![Some(1.0), Some(1.0), Some(1.0)]);
    assert!(report.is_complete());
}

#[test]
fn test_report_rejects_duplicate_records() {
    let a = vec![
        record("A", StrategyKind::Sequential, 100),
        record("A", StrategyKind::Sequential, 120),
    ];
    let result = ComparisonReport::build(&[("A", a.as_slice())], StrategyKind::Sequential);
    assert!(matches!(result, Err(BenchError::DuplicateStrategy(_))));
}

#[test]
fn test_report_serializes_as_data() {
    let a = vec![
        record("A", StrategyKind::Sequential, 100),
        record("A", StrategyKind::PooledThreads, 50),
    ];
    let b = vec![
        record("B", StrategyKind::Sequential, 300),
        record("B", StrategyKind::PooledThreads, 100),
    ];
    let report = ComparisonReport::build(
        &[("A", a.as_slice()), ("B", b.as_slice())],
        StrategyKind::Sequential,
    )
    .unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["baseline"], "sequential");
    assert_eq!(value["rows"][1]["test_type"], "pooled_threads");
    assert_eq!(value["rows"][1]["totals"], serde_json::json!([0.05, 0.1]));
    assert_eq!(value["rows"][1]["ratio"], 2.0);
}

#[test]
fn test_end_to_end_two_simulated_environments() {
    let tmp = tempfile::TempDir::new().unwrap();
    let results = JsonFileStore::new(tmp.path());
    let settings = RunConfig {
        pool_size: 5,
        pause_between_strategies_ms: 0,
        pause_between_environments_ms: 0,
        ..RunConfig::default()
    };
    let runner = EnvironmentRunner::new(settings, &results);
    let keys = ten_keys();
    let workload = lookup_bench::Workload::new(keys.clone());

    let runs = runner.run_all(
        vec![
            ("Fast".to_string(), memory_store(&keys, Duration::from_millis(2))),
            ("Slow".to_string(), memory_store(&keys, Duration::from_millis(10))),
        ],
        &workload,
    );
    let fast = runs[0].result.as_ref().unwrap();
    let slow = runs[1].result.as_ref().unwrap();

    let ratios = cross_environment_ratio(fast, slow);
    assert!(ratios.is_complete());
    assert!(ratios.ratios[&StrategyKind::Sequential] > 1.0);

    let report = ComparisonReport::build(
        &[("Fast", fast.as_slice()), ("Slow", slow.as_slice())],
        StrategyKind::Sequential,
    )
    .unwrap();
    assert_eq!(report.rows.len(), 3);
    assert!(report.rows.iter().all(|row| row.ratio.is_some()));
}
