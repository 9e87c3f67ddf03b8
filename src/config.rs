//! Configuration handling
//!
//! Settings live in `lookup-bench.toml`. Every section is optional and falls
//! back to the defaults below.
//!
//! ## Environment Variables
//!
//! The following environment variables override config file settings:
//!
//! - `LOOKUP_BENCH_RESULTS_DIR` - Directory result files are written to
//! - `LOOKUP_BENCH_POOL_SIZE` - Pool size for the concurrent strategies
//! - `LOOKUP_BENCH_KEYS` - Comma-separated workload keys
//!
//! These can be set in a `.env` file next to the config.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bench::{ProfileSchema, StrategyKind, Workload};
use crate::driver::{Key, PragmaProfile};
use crate::error::{BenchError, BenchResult};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "lookup-bench.toml";

/// Environment variable names
pub const ENV_RESULTS_DIR: &str = "LOOKUP_BENCH_RESULTS_DIR";
pub const ENV_POOL_SIZE: &str = "LOOKUP_BENCH_POOL_SIZE";
pub const ENV_KEYS: &str = "LOOKUP_BENCH_KEYS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default)]
    pub profile: ProfileSchema,
    #[serde(default = "default_environments", rename = "environment")]
    pub environments: Vec<EnvironmentConfig>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_table() -> String {
    "users".to_string()
}

fn default_key_column() -> String {
    "id".to_string()
}

fn default_environments() -> Vec<EnvironmentConfig> {
    vec![
        EnvironmentConfig {
            name: "Server_A".to_string(),
            path: PathBuf::from("server_a.db"),
            pragmas: PragmaProfile::tuned(),
        },
        EnvironmentConfig {
            name: "Server_B".to_string(),
            path: PathBuf::from("server_b.db"),
            pragmas: PragmaProfile::untuned(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_keys")]
    pub keys: Vec<Key>,
}

fn default_keys() -> Vec<Key> {
    vec![
        100_000, 200_000, 300_000, 400_000, 500_000, 600_000, 700_000, 800_000, 900_000, 150_000,
    ]
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_async_min_pool")]
    pub async_min_pool: usize,
    #[serde(default = "default_pause_between_strategies_ms")]
    pub pause_between_strategies_ms: u64,
    #[serde(default = "default_pause_between_environments_ms")]
    pub pause_between_environments_ms: u64,
    #[serde(default = "default_baseline")]
    pub baseline: StrategyKind,
    /// Per-lookup bound for the cooperative strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_timeout_ms: Option<u64>,
}

fn default_pool_size() -> usize {
    5
}

fn default_async_min_pool() -> usize {
    1
}

fn default_pause_between_strategies_ms() -> u64 {
    1000
}

fn default_pause_between_environments_ms() -> u64 {
    5000
}

fn default_baseline() -> StrategyKind {
    StrategyKind::Sequential
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            async_min_pool: default_async_min_pool(),
            pause_between_strategies_ms: default_pause_between_strategies_ms(),
            pause_between_environments_ms: default_pause_between_environments_ms(),
            baseline: default_baseline(),
            op_timeout_ms: None,
        }
    }
}

impl RunConfig {
    pub fn pause_between_strategies(&self) -> Duration {
        Duration::from_millis(self.pause_between_strategies_ms)
    }

    pub fn pause_between_environments(&self) -> Duration {
        Duration::from_millis(self.pause_between_environments_ms)
    }

    pub fn op_timeout(&self) -> Option<Duration> {
        self.op_timeout_ms.map(Duration::from_millis)
    }
}

/// One deployment under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub pragmas: PragmaProfile,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workload: WorkloadConfig::default(),
            run: RunConfig::default(),
            results_dir: default_results_dir(),
            table: default_table(),
            key_column: default_key_column(),
            profile: ProfileSchema::default(),
            environments: default_environments(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from `path`.
    ///
    /// A `.env` file in the same directory is loaded first. A missing config
    /// file falls back to the defaults; env overrides apply either way.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)?
        } else {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> BenchResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides to the configuration
    pub fn apply_env_overrides(&mut self) -> BenchResult<()> {
        if let Ok(dir) = std::env::var(ENV_RESULTS_DIR) {
            if !dir.is_empty() {
                self.results_dir = PathBuf::from(dir);
            }
        }

        if let Ok(raw) = std::env::var(ENV_POOL_SIZE) {
            self.run.pool_size = raw.trim().parse().map_err(|_| {
                BenchError::Config(format!("{} must be a positive integer, got '{}'", ENV_POOL_SIZE, raw))
            })?;
        }

        if let Ok(raw) = std::env::var(ENV_KEYS) {
            self.workload.keys = parse_keys(&raw)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.environments.is_empty() {
            return Err(BenchError::Config(
                "at least one [[environment]] is required".to_string(),
            ));
        }
        if self.run.pool_size == 0 {
            return Err(BenchError::Config("run.pool_size must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for env in &self.environments {
            if env.name.trim().is_empty() {
                return Err(BenchError::Config("environment name cannot be empty".to_string()));
            }
            if !seen.insert(env.name.as_str()) {
                return Err(BenchError::Config(format!(
                    "duplicate environment name '{}'",
                    env.name
                )));
            }
        }
        Ok(())
    }

    pub fn workload(&self) -> Workload {
        Workload::new(self.workload.keys.clone())
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.name == name)
    }
}

/// Comma-separated keys; blank entries are skipped.
pub fn parse_keys(raw: &str) -> BenchResult<Vec<Key>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Key>()
                .map_err(|_| BenchError::Config(format!("invalid key '{}'", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::from_toml_str("").unwrap();
        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.workload.keys.len(), 10);
        assert_eq!(config.workload.keys[9], 150_000);
        assert_eq!(config.run.pool_size, 5);
        assert_eq!(config.run.baseline, StrategyKind::Sequential);
        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.environments[1].pragmas, PragmaProfile::untuned());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let config = BenchConfig::from_toml_str(
            r#"
            results_dir = "out"
            table = "accounts"

            [workload]
            keys = [1, 2, 3]

            [run]
            pool_size = 8
            baseline = "pooled_threads"
            op_timeout_ms = 250

            [[environment]]
            name = "Primary"
            path = "primary.db"

            [environment.pragmas]
            journal_mode = "WAL"
            cache_size = -2000
            "#,
        )
        .unwrap();

        assert_eq!(config.results_dir, PathBuf::from("out"));
        assert_eq!(config.table, "accounts");
        assert_eq!(config.key_column, "id");
        assert_eq!(config.workload().keys(), &[1, 2, 3]);
        assert_eq!(config.run.pool_size, 8);
        assert_eq!(config.run.async_min_pool, 1);
        assert_eq!(config.run.baseline, StrategyKind::PooledThreads);
        assert_eq!(config.run.op_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.environments.len(), 1);
        assert_eq!(config.environments[0].pragmas.journal_mode.as_deref(), Some("WAL"));
        assert_eq!(config.environments[0].pragmas.synchronous, None);
        assert!(config.environment("Primary").is_some());
    }

    #[test]
    fn test_validation() {
        let mut config = BenchConfig::default();
        config.run.pool_size = 0;
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));

        let mut config = BenchConfig::default();
        config.environments[1].name = "Server_A".to_string();
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));

        let mut config = BenchConfig::default();
        config.environments.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(parse_keys("1, 2,,3 ").unwrap(), vec![1, 2, 3]);
        assert!(parse_keys("1,x").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            BenchConfig::from_toml_str("[run]\npool_size = \"many\""),
            Err(BenchError::Toml(_))
        ));
    }
}
