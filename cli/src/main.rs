mod gather;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hoist_core::{
    EngineConfig, FsObjectStore, SubmitError, TaskEvent, TaskId, TransferRequest, TransferStatus,
    UploadEngine,
};

/// Batch-upload files to an object store bucket.
#[derive(Debug, Parser)]
#[command(name = "hoist", version)]
struct Args {
    /// Files or directories to upload (directories are walked)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Target bucket
    #[arg(long)]
    bucket: String,

    /// Root directory of the local object store
    #[arg(long)]
    store_root: PathBuf,

    /// Key prefix prepended to every object key
    #[arg(long, default_value = "")]
    prefix: String,

    /// Engine configuration file (TOML, all fields optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Override attempts per task
    #[arg(long)]
    max_attempts: Option<u32>,

    /// How long shutdown waits for in-flight uploads before force-cancelling
    #[arg(long, default_value_t = 3600)]
    drain_timeout_secs: u64,

    /// Print events as JSON lines instead of a progress bar
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let failed = run(args).await?;
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<u64> {
    let config = load_config(&args)?;

    let requests = gather::gather_requests(&args.paths, &args.bucket, &args.prefix)?;
    anyhow::ensure!(!requests.is_empty(), "nothing to upload");
    let total = requests.len();

    // Local store: create the bucket directory up front so a fresh store
    // root works out of the box.
    std::fs::create_dir_all(args.store_root.join(&args.bucket))
        .with_context(|| format!("creating bucket dir under {}", args.store_root.display()))?;
    let store = Arc::new(FsObjectStore::new(&args.store_root));

    let (engine, events) = UploadEngine::new(config, store)?;
    let renderer = tokio::spawn(render_events(events, total as u64, args.json));

    let keys_by_id = submit_all(&engine, requests).await?;

    let report = engine
        .shutdown(Duration::from_secs(args.drain_timeout_secs))
        .await;
    if !report.drained {
        tracing::warn!(force_cancelled = report.force_cancelled, "drain timeout expired");
    }

    let snapshot = engine.snapshot();
    drop(engine); // closes the event stream so the renderer finishes
    renderer.await.context("event renderer panicked")?;

    let mut succeeded = 0u64;
    let mut failed = 0u64;
    let mut cancelled = 0u64;
    for (id, status) in &snapshot {
        match status {
            TransferStatus::Succeeded => succeeded += 1,
            TransferStatus::Failed { error } => {
                failed += 1;
                let key = keys_by_id.get(id).map(String::as_str).unwrap_or("?");
                eprintln!("failed: {key}: {error}");
            }
            TransferStatus::Cancelled => cancelled += 1,
            _ => {}
        }
    }
    eprintln!("{succeeded} uploaded, {failed} failed, {cancelled} cancelled");

    Ok(failed)
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    Ok(config)
}

/// Submit everything, shrinking the batch and waiting briefly whenever the
/// queue pushes back.
async fn submit_all(
    engine: &UploadEngine,
    requests: Vec<TransferRequest>,
) -> anyhow::Result<HashMap<TaskId, String>> {
    let mut keys_by_id = HashMap::new();
    let mut remaining = requests.as_slice();
    let mut batch = remaining.len();

    while !remaining.is_empty() {
        batch = batch.min(remaining.len()).max(1);
        let (chunk, rest) = remaining.split_at(batch);

        match engine.submit(chunk.to_vec()) {
            Ok(ids) => {
                for (id, req) in ids.into_iter().zip(chunk) {
                    keys_by_id.insert(id, req.key.clone());
                }
                remaining = rest;
            }
            Err(SubmitError::QueueFull) => {
                if batch > 1 {
                    batch /= 2;
                } else {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(keys_by_id)
}

/// Drain the event stream until the engine closes it, rendering either a
/// progress bar counting terminal tasks or raw JSON lines.
async fn render_events(mut events: mpsc::UnboundedReceiver<TaskEvent>, total: u64, json: bool) {
    let bar = if json {
        None
    } else {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            bar.set_style(style);
        }
        Some(bar)
    };

    while let Some(event) = events.recv().await {
        match &bar {
            Some(bar) => {
                if event.status.is_terminal() {
                    bar.inc(1);
                }
                if let TransferStatus::Retrying { attempt, .. } = &event.status {
                    bar.set_message(format!("retrying {} (attempt {attempt})", event.task_id));
                }
            }
            None => {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}
