use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use lookup_bench::bench::{
    compare_query_profiles, run_query_profile, QueryCase, QueryProfileComparison,
};
use lookup_bench::config::CONFIG_FILE_NAME;
use lookup_bench::driver::{MemoryStore, SqliteConnector};
use lookup_bench::{
    cross_environment_ratio, speedup_table, BenchConfig, ComparisonReport, EnvironmentRunner,
    JsonFileStore, ResultStore, StrategyKind, StrategyRunRecord,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lookup-bench")]
#[command(about = "Compare concurrency strategies for point lookups across store deployments", long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Directory result files are read from and written to
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// Use simulated in-memory stores instead of SQLite files
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every strategy against every configured environment
    Run,
    /// Compare stored results of two environments without running anything
    Compare {
        /// First environment (defaults to the first configured one)
        env_a: Option<String>,
        /// Second environment (defaults to the second configured one)
        env_b: Option<String>,
    },
    /// Time the fixed query set once per environment
    Profile,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookup_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = BenchConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(dir) = args.results_dir {
        config.results_dir = dir;
    }
    let store = JsonFileStore::new(&config.results_dir);

    match args.command {
        Command::Run => run(&config, &store, args.dry_run),
        Command::Compare { env_a, env_b } => compare(&config, &store, env_a, env_b),
        Command::Profile => profile(&config, &store, args.dry_run),
    }
}

fn run(config: &BenchConfig, store: &JsonFileStore, dry_run: bool) -> anyhow::Result<()> {
    let runner = EnvironmentRunner::new(config.run.clone(), store);
    let workload = config.workload();

    let runs = if dry_run {
        runner.run_all(memory_environments(config), &workload)
    } else {
        runner.run_all(sqlite_environments(config)?, &workload)
    };

    let mut completed: Vec<(&str, &[StrategyRunRecord])> = Vec::new();
    for run in &runs {
        match &run.result {
            Ok(records) => {
                print_environment(&run.environment, records, config.run.baseline);
                completed.push((run.environment.as_str(), records.as_slice()));
            }
            Err(e) => {
                println!("\n{} {}: {}", "✗".red(), run.environment.bold(), e.to_string().red());
            }
        }
    }

    if completed.len() >= 2 {
        let report = ComparisonReport::build(&completed, config.run.baseline)?;
        print_report(&report);
    }

    println!("\nResults written to {}", store.dir().display().to_string().dimmed());
    Ok(())
}

fn compare(
    config: &BenchConfig,
    store: &JsonFileStore,
    env_a: Option<String>,
    env_b: Option<String>,
) -> anyhow::Result<()> {
    let configured = |i: usize| config.environments.get(i).map(|e| e.name.clone());
    let env_a = env_a
        .or_else(|| configured(0))
        .context("no first environment given or configured")?;
    let env_b = env_b
        .or_else(|| configured(1))
        .context("no second environment given or configured")?;

    let records_a = read_stored(store, &env_a)?;
    let records_b = read_stored(store, &env_b)?;

    print_environment(&env_a, &records_a, config.run.baseline);
    print_environment(&env_b, &records_b, config.run.baseline);

    let report = ComparisonReport::build(
        &[
            (env_a.as_str(), records_a.as_slice()),
            (env_b.as_str(), records_b.as_slice()),
        ],
        config.run.baseline,
    )?;
    print_report(&report);

    let ratios = cross_environment_ratio(&records_a, &records_b);
    if !ratios.is_complete() {
        let missing: Vec<&str> = ratios.unmatched.iter().map(|k| k.as_str()).collect();
        println!(
            "{} only one environment has: {}",
            "!".yellow(),
            missing.join(", ")
        );
    }
    Ok(())
}

fn read_stored(store: &JsonFileStore, environment: &str) -> anyhow::Result<Vec<StrategyRunRecord>> {
    store.read(environment)?.with_context(|| {
        format!(
            "no stored results for '{}', run `lookup-bench run` first",
            environment
        )
    })
}

fn profile(config: &BenchConfig, store: &JsonFileStore, dry_run: bool) -> anyhow::Result<()> {
    if dry_run {
        anyhow::bail!("the query profile needs SQLite environments and cannot run with --dry-run");
    }

    let cases = QueryCase::defaults(&config.profile);
    let mut profiles = Vec::new();
    for (i, (name, connector)) in sqlite_environments(config)?.into_iter().enumerate() {
        if i > 0 {
            std::thread::sleep(config.run.pause_between_environments());
        }
        match run_query_profile(&name, &connector, &cases) {
            Ok(timings) => {
                store.write_query_profile(&name, &timings)?;
                println!("\n{}", name.bold());
                for t in &timings {
                    match &t.error {
                        None => println!(
                            "  {} {:<20} {:>10.3} ms  {}",
                            "✓".green(),
                            t.query,
                            ms(t.duration),
                            format!("({} rows)", t.row_count).dimmed()
                        ),
                        Some(e) => println!("  {} {:<20} {}", "✗".red(), t.query, e.red()),
                    }
                }
                profiles.push((name, timings));
            }
            Err(e) => {
                tracing::error!(environment = %name, error = %e, "Environment unreachable, skipping");
            }
        }
    }

    if let [(name_a, a), (name_b, b), ..] = profiles.as_slice() {
        print_profile_comparison(name_a, name_b, &compare_query_profiles(a, b));
    }
    Ok(())
}

fn sqlite_environments(config: &BenchConfig) -> anyhow::Result<Vec<(String, SqliteConnector)>> {
    config
        .environments
        .iter()
        .map(|env| {
            let connector = SqliteConnector::new(
                &env.path,
                &config.table,
                &config.key_column,
                env.pragmas.clone(),
            )
            .with_context(|| format!("invalid settings for environment '{}'", env.name))?;
            Ok((env.name.clone(), connector))
        })
        .collect()
}

/// Simulated stores, each environment slower than the one before it.
fn memory_environments(config: &BenchConfig) -> Vec<(String, MemoryStore)> {
    config
        .environments
        .iter()
        .enumerate()
        .map(|(i, env)| {
            let store = MemoryStore::builder()
                .rows(
                    config
                        .workload
                        .keys
                        .iter()
                        .map(|&key| (key, json!({ "id": key }))),
                )
                .latency(Duration::from_millis(5 * (i as u64 + 1)))
                .build();
            (env.name.clone(), store)
        })
        .collect()
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn print_environment(environment: &str, records: &[StrategyRunRecord], baseline: StrategyKind) {
    let speedups = speedup_table(records, baseline).ok();

    println!("\n{}", environment.bold());
    println!(
        "  {:<20} {:>12} {:>12} {:>8} {:>9}",
        "strategy", "total ms", "mean ms", "failed", "speedup"
    );
    for record in records {
        let speedup = speedups
            .as_ref()
            .and_then(|t| t.get(&record.strategy))
            .map(|s| format!("{:.2}x", s))
            .unwrap_or_else(|| "-".to_string());
        let failed = if record.failed_count > 0 {
            record.failed_count.to_string().red()
        } else {
            record.failed_count.to_string().normal()
        };
        println!(
            "  {:<20} {:>12.3} {:>12.3} {:>8} {:>9}",
            record.strategy.as_str(),
            ms(record.total_duration),
            ms(record.mean_duration),
            failed,
            speedup.green()
        );
        if record.is_degenerate() {
            println!("  {} every lookup failed", "!".yellow());
        }
    }
}

fn print_report(report: &ComparisonReport) {
    println!("\n{}", "Cross-environment comparison".bold());

    let mut header = format!("  {:<20}", "strategy");
    for env in &report.environments {
        header.push_str(&format!(" {:>14}", format!("{} ms", env)));
    }
    if report.environments.len() == 2 {
        header.push_str(&format!(" {:>8}", "ratio"));
    }
    println!("{}", header);

    for row in &report.rows {
        let mut line = format!("  {:<20}", row.test_type.as_str());
        for total in &row.totals {
            line.push_str(&format!(" {:>14.3}", ms(*total)));
        }
        if let Some(ratio) = row.ratio {
            line.push_str(&format!(" {:>7.2}x", ratio));
        }
        println!("{}", line);
    }

    if !report.is_complete() {
        let missing: Vec<&str> = report.unmatched.iter().map(|k| k.as_str()).collect();
        println!(
            "  {} not run everywhere: {}",
            "!".yellow(),
            missing.join(", ")
        );
    }
}

fn print_profile_comparison(name_a: &str, name_b: &str, comparison: &QueryProfileComparison) {
    println!("\n{}", "Query profile comparison".bold());
    println!(
        "  {:<20} {:>14} {:>14} {:>12}",
        "query",
        format!("{} ms", name_a),
        format!("{} ms", name_b),
        "improvement"
    );
    for row in &comparison.rows {
        println!(
            "  {:<20} {:>14.3} {:>14.3} {:>11.2}x",
            row.query,
            ms(row.duration_a),
            ms(row.duration_b),
            row.improvement
        );
    }
    println!("  overall: {}", format!("{:.2}x", comparison.overall).green());

    for name in comparison.failed.iter().chain(comparison.unmatched.iter()) {
        println!("  {} not compared: {}", "!".yellow(), name);
    }
}
