//! Workload generator for exercising the Strata client core.
//!
//! This binary drives mixed transactional and plain traffic through the
//! full client stack (coordinator, dispatcher, value envelope) against an
//! in-process store, and reports per-worker counters. It is a smoke and
//! soak harness for the client, not a benchmark of any storage engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time;
use tracing::info;

use strata_client::{Client, Clock, LocalSender, SystemClock, TransactionOptions};
use strata_proto::Error;

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "strata-workload")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for running the workload.
#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Number of concurrent workers sharing the client handle.
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Number of hot keys used by the workload.
    #[arg(long, default_value_t = 16)]
    keys: usize,

    /// Key prefix/namespace. Keys are generated as `{key_prefix}k{idx}`.
    #[arg(long, default_value = "strata_")]
    key_prefix: String,

    /// Percent of operations that run as a multi-key transaction.
    #[arg(long, default_value_t = 40)]
    txn_pct: u8,

    /// Percent of the remaining plain operations that are writes.
    #[arg(long, default_value_t = 50)]
    write_pct: u8,

    /// Total runtime for the workload.
    #[arg(long, default_value = "10s")]
    duration: humantime::Duration,

    /// Random seed (0 picks a random seed).
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write a JSON summary to this path when set.
    #[arg(long)]
    out: Option<PathBuf>,
}

/// Counters shared by all workers.
#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    increments: AtomicU64,
    txn_commits: AtomicU64,
    txn_restarts: AtomicU64,
    errors: AtomicU64,
}

/// Final report serialized for later inspection.
#[derive(serde::Serialize, Debug)]
struct Summary {
    workers: usize,
    keys: usize,
    seed: u64,
    duration_ms: u64,
    gets: u64,
    puts: u64,
    increments: u64,
    txn_commits: u64,
    txn_restarts: u64,
    errors: u64,
    live_keys: usize,
    ops_per_sec: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Run(args) => run_workload(args).await,
    }
}

async fn run_workload(args: RunArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.workers > 0, "workload requires at least one worker");
    anyhow::ensure!(args.keys > 0, "workload requires at least one key");
    anyhow::ensure!(args.txn_pct <= 100, "--txn-pct must be within 0..=100");
    anyhow::ensure!(args.write_pct <= 100, "--write-pct must be within 0..=100");

    let seed = if args.seed == 0 {
        rand::thread_rng().gen()
    } else {
        args.seed
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(LocalSender::new(clock.clone()));
    let mut client = Client::new(store.clone(), clock);
    client.user = "workload".to_string();
    let client = Arc::new(client);

    let counters = Arc::new(Counters::default());
    let deadline = Instant::now() + *args.duration;
    info!(
        workers = args.workers,
        keys = args.keys,
        seed,
        duration = %args.duration,
        "starting workload"
    );

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let client = client.clone();
        let counters = counters.clone();
        let args = args.clone();
        let rng = SmallRng::seed_from_u64(seed.wrapping_add(worker as u64));
        tasks.push(tokio::spawn(run_worker(
            worker, client, counters, args, rng, deadline,
        )));
    }
    for task in tasks {
        task.await.context("worker task panicked")??;
    }
    let elapsed = start.elapsed();

    let summary = Summary {
        workers: args.workers,
        keys: args.keys,
        seed,
        duration_ms: elapsed.as_millis() as u64,
        gets: counters.gets.load(Ordering::Relaxed),
        puts: counters.puts.load(Ordering::Relaxed),
        increments: counters.increments.load(Ordering::Relaxed),
        txn_commits: counters.txn_commits.load(Ordering::Relaxed),
        txn_restarts: counters.txn_restarts.load(Ordering::Relaxed),
        errors: counters.errors.load(Ordering::Relaxed),
        live_keys: store.len(),
        ops_per_sec: {
            let total = counters.gets.load(Ordering::Relaxed)
                + counters.puts.load(Ordering::Relaxed)
                + counters.increments.load(Ordering::Relaxed)
                + counters.txn_commits.load(Ordering::Relaxed);
            total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        },
    };
    info!(?summary, "workload finished");

    if let Some(path) = &args.out {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    anyhow::ensure!(
        summary.errors == 0,
        "workload observed {} unexpected errors",
        summary.errors
    );
    Ok(())
}

async fn run_worker(
    worker: usize,
    client: Arc<Client>,
    counters: Arc<Counters>,
    args: RunArgs,
    mut rng: SmallRng,
    deadline: Instant,
) -> anyhow::Result<()> {
    while Instant::now() < deadline {
        let roll: u8 = rng.gen_range(0..100);
        let result = if roll < args.txn_pct {
            run_transfer_txn(&client, &counters, &args, &mut rng).await
        } else if rng.gen_range(0..100u8) < args.write_pct {
            counters.puts.fetch_add(1, Ordering::Relaxed);
            let key = pick_key(&args, &mut rng);
            let value = format!("w{worker}-{}", rng.gen::<u32>());
            client.put_bytes(key.as_bytes(), value.into_bytes()).await
        } else {
            counters.gets.fetch_add(1, Ordering::Relaxed);
            let key = pick_key(&args, &mut rng);
            client.get_bytes(key.as_bytes()).await.map(|_| ())
        };

        if let Err(err) = result {
            counters.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(worker, error = %err, "operation failed");
        }

        // Yield so the scheduler can interleave workers on one runtime.
        time::sleep(time::Duration::from_micros(50)).await;
    }
    Ok(())
}

/// Move a random amount between two counter keys inside one transaction.
async fn run_transfer_txn(
    client: &Arc<Client>,
    counters: &Arc<Counters>,
    args: &RunArgs,
    rng: &mut SmallRng,
) -> Result<(), Error> {
    let from = format!("{}acct{}", args.key_prefix, rng.gen_range(0..args.keys));
    let to = format!("{}acct{}", args.key_prefix, rng.gen_range(0..args.keys));
    let amount: i64 = rng.gen_range(1..100);

    let attempts = Arc::new(AtomicU64::new(0));
    let attempts_in_txn = attempts.clone();
    let result = client
        .run_transaction(
            TransactionOptions {
                name: "transfer".to_string(),
                ..TransactionOptions::default()
            },
            move |txn| {
                let from = from.clone();
                let to = to.clone();
                let attempts = attempts_in_txn.clone();
                async move {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    txn.increment(from.as_bytes(), -amount).await?;
                    txn.increment(to.as_bytes(), amount).await?;
                    Ok(())
                }
            },
        )
        .await;

    counters.increments.fetch_add(2, Ordering::Relaxed);
    let attempts = attempts.load(Ordering::Relaxed);
    if attempts > 1 {
        counters
            .txn_restarts
            .fetch_add(attempts - 1, Ordering::Relaxed);
    }
    if result.is_ok() {
        counters.txn_commits.fetch_add(1, Ordering::Relaxed);
    }
    result
}

fn pick_key(args: &RunArgs, rng: &mut SmallRng) -> String {
    format!("{}k{}", args.key_prefix, rng.gen_range(0..args.keys))
}
