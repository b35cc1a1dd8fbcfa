use std::fs;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use e2e_tests::{t0, Behavior, TestHarness};
use reindex_storage::Storage;
use reindex_types::ReindexSettings;

const MAX_PASSES: usize = 10_000;

#[derive(Parser, Debug)]
#[command(name = "reindex_bench", about = "Resource reindexing throughput benchmark")]
struct Args {
    /// Optional config file layered over the defaults
    #[arg(long)]
    config: Option<String>,
    /// Job store directory, overriding the configured db_path
    #[arg(long)]
    db_path: Option<String>,
    #[arg(long, default_value_t = 5_000)]
    resources: usize,
    /// Resources sharing each last-modified millisecond
    #[arg(long, default_value_t = 1)]
    per_timestamp: usize,
    /// Scan page size
    #[arg(long, default_value_t = 1_000)]
    page_size: usize,
    /// Simulated work per resource
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    /// Every Nth resource fails to reindex (0 = none)
    #[arg(long, default_value_t = 0)]
    fail_every: usize,
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Report {
    resources: usize,
    threads: usize,
    page_size: usize,
    passes: usize,
    reindexed: usize,
    elapsed_ms: u128,
    per_sec: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings =
        ReindexSettings::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(threads) = args.threads {
        settings.reindex_thread_count = threads;
    }
    if let Some(db_path) = &args.db_path {
        settings.db_path = db_path.clone();
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let db_path = settings.expanded_db_path();
    info!("Opening job store at {:?}", db_path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create job store directory")?;
    }
    let storage = Arc::new(Storage::open(&db_path).context("Failed to open job store")?);

    let threads = settings.reindex_thread_count;
    let harness = TestHarness::with_storage(storage, settings, Some(args.page_size));
    // Jobs left behind by an earlier run would skew the numbers
    let stale = harness.service.cancel_and_purge_all()?;
    if stale > 0 {
        info!(stale, "Purged jobs from an earlier run");
    }
    let per_timestamp = args.per_timestamp.max(1);
    for i in 0..args.resources {
        let updated = t0() + Duration::milliseconds((i / per_timestamp) as i64);
        harness.resources.insert(i as i64 + 1, "Patient", updated);
        if args.fail_every > 0 && (i + 1) % args.fail_every == 0 {
            harness.resources.set_behavior(i as i64 + 1, Behavior::Fail);
        }
    }
    harness
        .resources
        .set_reindex_delay(StdDuration::from_millis(args.delay_ms));

    info!(resources = args.resources, threads, "Starting reindex benchmark");
    harness.service.mark_all_for_reindexing()?;

    let start = Instant::now();
    let mut passes = 0;
    while harness.storage.job_count()? > 0 && passes < MAX_PASSES {
        harness.service.force_pass().await?;
        passes += 1;
    }
    let elapsed = start.elapsed();

    let reindexed = harness.resources.reindexed().len();
    let report = Report {
        resources: args.resources,
        threads,
        page_size: args.page_size,
        passes,
        reindexed,
        elapsed_ms: elapsed.as_millis(),
        per_sec: reindexed as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
