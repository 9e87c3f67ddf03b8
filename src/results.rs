//! Result persistence
//!
//! Run records are stored per environment, keyed by environment name and
//! strategy. A missing result set is "no prior run", never an error.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bench::{QueryTiming, StrategyRunRecord};
use crate::error::{BenchError, BenchResult};

pub trait ResultStore {
    /// Insert or replace the record for `(record.environment, record.strategy)`.
    fn write(&self, record: &StrategyRunRecord) -> BenchResult<()>;

    /// Replace everything stored for `environment` with `records` in one step.
    fn replace(&self, environment: &str, records: &[StrategyRunRecord]) -> BenchResult<()>;

    /// All records stored for `environment`, or `None` if it was never run.
    fn read(&self, environment: &str) -> BenchResult<Option<Vec<StrategyRunRecord>>>;
}

/// One pretty-printed JSON array per environment under a results directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records_path(&self, environment: &str) -> PathBuf {
        self.dir
            .join(format!("parallel_results_{}.json", slug(environment)))
    }

    pub fn profile_path(&self, environment: &str) -> PathBuf {
        self.dir
            .join(format!("performance_results_{}.json", slug(environment)))
    }

    /// Replace the stored query profile of `environment`.
    pub fn write_query_profile(&self, environment: &str, timings: &[QueryTiming]) -> BenchResult<()> {
        write_json(&self.profile_path(environment), timings)
    }

    pub fn read_query_profile(&self, environment: &str) -> BenchResult<Option<Vec<QueryTiming>>> {
        read_json(&self.profile_path(environment))
    }
}

impl ResultStore for JsonFileStore {
    fn write(&self, record: &StrategyRunRecord) -> BenchResult<()> {
        let path = self.records_path(&record.environment);
        let mut records: Vec<StrategyRunRecord> = read_json(&path)?.unwrap_or_default();

        match records.iter_mut().find(|r| r.strategy == record.strategy) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }

        write_json(&path, &records)?;
        tracing::debug!(
            environment = %record.environment,
            strategy = %record.strategy,
            path = %path.display(),
            "Stored run record"
        );
        Ok(())
    }

    fn replace(&self, environment: &str, records: &[StrategyRunRecord]) -> BenchResult<()> {
        if let Some(stray) = records.iter().find(|r| r.environment != environment) {
            return Err(BenchError::MixedEnvironments {
                expected: environment.to_string(),
                found: stray.environment.clone(),
            });
        }

        let path = self.records_path(environment);
        write_json(&path, records)?;
        tracing::debug!(
            environment,
            records = records.len(),
            path = %path.display(),
            "Replaced run records"
        );
        Ok(())
    }

    fn read(&self, environment: &str) -> BenchResult<Option<Vec<StrategyRunRecord>>> {
        read_json(&self.records_path(environment))
    }
}

/// Lower-cased environment name with spaces turned into underscores
pub fn slug(environment: &str) -> String {
    environment.to_lowercase().replace(' ', "_")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> BenchResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write through a temp file in the same directory, then rename over the target.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("json.tmp");
    let mut temp_file = File::create(&temp_path)?;
    serde_json::to_writer_pretty(&mut temp_file, value)?;
    temp_file.write_all(b"\n")?;
    temp_file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{aggregate, Outcome, StrategyKind, TimedResult};
    use std::time::Duration;
    use tempfile::tempdir;

    fn record(env: &str, strategy: StrategyKind, total_ms: u64) -> StrategyRunRecord {
        let results = vec![TimedResult::new(1, Duration::from_millis(1), Outcome::NotFound)];
        aggregate(strategy, env, &results, Duration::from_millis(total_ms), None)
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Server_A"), "server_a");
        assert_eq!(slug("Primary Replica"), "primary_replica");
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.read("Server_A").unwrap().is_none());
        assert!(store.read_query_profile("Server_A").unwrap().is_none());
    }

    #[test]
    fn test_write_upserts_by_strategy() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));

        store.write(&record("Server_A", StrategyKind::Sequential, 100)).unwrap();
        store.write(&record("Server_A", StrategyKind::PooledThreads, 40)).unwrap();
        store.write(&record("Server_A", StrategyKind::Sequential, 90)).unwrap();

        let records = store.read("Server_A").unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].strategy, StrategyKind::Sequential);
        assert!((records[0].total_duration.as_secs_f64() - 0.09).abs() < 1e-9);
        assert!(store.records_path("Server_A").ends_with("parallel_results_server_a.json"));
        assert!(!store.records_path("Server_A").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_replace_drops_previous_records() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.write(&record("Server_A", StrategyKind::Sequential, 100)).unwrap();
        store.write(&record("Server_A", StrategyKind::PooledThreads, 40)).unwrap();

        store
            .replace("Server_A", &[record("Server_A", StrategyKind::CooperativeAsync, 20)])
            .unwrap();
        let stored = store.read("Server_A").unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].strategy, StrategyKind::CooperativeAsync);

        let stray = vec![record("Server_B", StrategyKind::Sequential, 1)];
        assert!(matches!(
            store.replace("Server_A", &stray),
            Err(BenchError::MixedEnvironments { .. })
        ));
        assert_eq!(store.read("Server_A").unwrap().unwrap(), stored);
    }

    #[test]
    fn test_environments_are_separate() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.write(&record("Server_A", StrategyKind::Sequential, 1)).unwrap();
        assert!(store.read("Server_B").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(store.records_path("Server_A"), "not json").unwrap();
        assert!(store.read("Server_A").is_err());
    }
}
