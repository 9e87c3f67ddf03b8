//! Config file loading and environment overrides

use std::path::PathBuf;

use lookup_bench::config::{ENV_KEYS, ENV_POOL_SIZE, ENV_RESULTS_DIR};
use lookup_bench::driver::PragmaProfile;
use lookup_bench::{BenchConfig, BenchError};
use tempfile::TempDir;

const SAMPLE: &str = include_str!("../lookup-bench.toml");

#[test]
fn test_sample_config_matches_defaults() {
    let config = BenchConfig::from_toml_str(SAMPLE).unwrap();
    assert_eq!(config, BenchConfig::default());
    assert_eq!(config.environments[0].pragmas, PragmaProfile::tuned());
}

// Single test touching process environment, so no other test races it
#[test]
fn test_load_applies_dotenv_and_overrides() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("lookup-bench.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    std::fs::write(
        tmp.path().join(".env"),
        format!("{}=7\n{}=1, 2,3\n", ENV_POOL_SIZE, ENV_KEYS),
    )
    .unwrap();
    std::env::set_var(ENV_RESULTS_DIR, "elsewhere");

    let config = BenchConfig::load(&path).unwrap();
    assert_eq!(config.run.pool_size, 7);
    assert_eq!(config.workload.keys, vec![1, 2, 3]);
    assert_eq!(config.results_dir, PathBuf::from("elsewhere"));

    std::env::set_var(ENV_POOL_SIZE, "0");
    assert!(matches!(
        BenchConfig::load(&path),
        Err(BenchError::Config(_))
    ));

    std::env::remove_var(ENV_POOL_SIZE);
    std::env::remove_var(ENV_KEYS);
    std::env::remove_var(ENV_RESULTS_DIR);
}
