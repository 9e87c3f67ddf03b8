//! Common test utilities for harness tests
//!
//! Provides shared helpers for:
//! - Seeding a SQLite users table in a temp dir
//! - Building simulated memory stores
//! - Fabricating run records for comparison tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use lookup_bench::driver::{MemoryStore, PragmaProfile, SqliteConnector};
use lookup_bench::{StrategyKind, StrategyRunRecord};
use serde_json::json;
use tempfile::TempDir;

/// Keys 100000..=900000 in steps of 100000 plus 150000, as the default workload
pub fn ten_keys() -> Vec<i64> {
    let mut keys: Vec<i64> = (1..=9).map(|i| i * 100_000).collect();
    keys.push(150_000);
    keys
}

/// Users table holding `keys`, with rusqlite writing straight to a temp file.
pub fn create_seeded_db(keys: &[i64]) -> (PathBuf, TempDir) {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = tmp_dir.path().join("users.db");
    let mut conn = rusqlite::Connection::open(&path).expect("Failed to create database");

    conn.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            surname TEXT NOT NULL,
            email TEXT NOT NULL,
            birth_date TEXT NOT NULL
        );",
    )
    .unwrap();

    let tx = conn.transaction().unwrap();
    for key in keys {
        tx.execute(
            "INSERT INTO users (id, name, surname, email, birth_date) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                key,
                format!("user{}", key),
                if key % 2 == 0 { "Smith" } else { "Jones" },
                format!("user{}@gmail.com", key),
                "1995-06-15",
            ],
        )
        .unwrap();
    }
    tx.commit().unwrap();

    (path, tmp_dir)
}

pub fn sqlite_connector(path: &PathBuf, pragmas: PragmaProfile) -> SqliteConnector {
    SqliteConnector::new(path, "users", "id", pragmas).expect("Failed to build connector")
}

/// Memory store holding `keys`, each lookup taking `latency`.
pub fn memory_store(keys: &[i64], latency: Duration) -> MemoryStore {
    MemoryStore::builder()
        .rows(keys.iter().map(|&k| (k, json!({"id": k}))))
        .latency(latency)
        .build()
}

pub fn record(environment: &str, strategy: StrategyKind, total_ms: u64) -> StrategyRunRecord {
    StrategyRunRecord {
        environment: environment.to_string(),
        strategy,
        total_duration: Duration::from_millis(total_ms),
        mean_duration: Duration::ZERO,
        query_count: 0,
        failed_count: 0,
        concurrency: None,
        keys: Vec::new(),
        per_key_durations: Vec::new(),
        outcomes: Vec::new(),
        recorded_at: Utc::now(),
    }
}
