//! # llq-runner
//!
//! Entry point for the low-latency queue pipeline.
//!
//! Runs the configured pipeline (by default the fixed two-group pipeline) to
//! completion, logs each role's report and checks that every published trade
//! was processed exactly once.
//!
//! # Usage
//!
//! ```bash
//! llq-runner                              # fixed pipeline
//! llq-runner --config pipeline.json       # custom groups
//! llq-runner --repeat 5                   # timed quiet runs, min / avg / max
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use llq_core::config::PipelineConfig;
use llq_pipeline::{Pipeline, PipelineSummary};
use tracing::{info, warn};

/// Low-latency queue pipeline runner.
#[derive(Parser)]
#[command(name = "llq-runner", about = "Low-latency queue pipeline runner")]
struct Cli {
    /// Configuration file path (JSON). Runs the fixed pipeline when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Run the pipeline this many times without per-role logs and report
    /// the wall time of each run.
    #[arg(long)]
    repeat: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = match &cli.config {
        Some(path) => llq_core::config::load_config(path)?,
        None => PipelineConfig::default(),
    };

    // 2. Initialize logging
    let module_name = config.module_name();
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    let _log_guard = llq_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &module_name);

    info!(
        "{module_name} starting: {} group(s), {} thread(s) on {} core(s), config={}",
        config.groups.len(),
        config.thread_count(),
        llq_core::cpu_affinity::available_cores(),
        cli.config.as_ref().map_or_else(|| "<default>".to_string(), |p| p.display().to_string()),
    );

    // 3. Run
    match cli.repeat {
        Some(n) => run_repeated(&config, n).await,
        None => run_once(&config).await,
    }
}

async fn run_once(config: &PipelineConfig) -> Result<()> {
    let (summary, interrupted) = run_pipeline(config, false).await?;
    log_summary(&summary);

    if interrupted {
        warn!("pipeline interrupted before completion");
        return Ok(());
    }
    if !summary.is_conserved() {
        bail!("conservation check failed");
    }
    info!("all {} trade(s) processed exactly once", summary.total_processed());
    Ok(())
}

async fn run_repeated(config: &PipelineConfig, runs: u32) -> Result<()> {
    let mut times = Vec::with_capacity(runs as usize);

    for i in 1..=runs {
        let (summary, interrupted) = run_pipeline(config, true).await?;
        if interrupted {
            warn!("run {i}/{runs} interrupted, stopping");
            break;
        }
        if !summary.is_conserved() {
            log_summary(&summary);
            bail!("run {i}/{runs}: conservation check failed");
        }
        info!("run {i}/{runs}: {:?} ({} trades)", summary.elapsed, summary.total_processed());
        times.push(summary.elapsed);
    }

    if let (Some(min), Some(max)) = (times.iter().min(), times.iter().max()) {
        let avg = times.iter().sum::<Duration>() / times.len() as u32;
        info!("{} run(s): min={min:?} avg={avg:?} max={max:?}", times.len());
    }
    Ok(())
}

/// Start the pipeline and wait for it on a blocking thread, shutting it down
/// on Ctrl+C. Returns the summary and whether the run was interrupted.
async fn run_pipeline(config: &PipelineConfig, quiet: bool) -> Result<(PipelineSummary, bool)> {
    let pipeline = if quiet { Pipeline::quiet(config)? } else { Pipeline::new(config)? };
    let running = pipeline.start()?;
    let handle = running.shutdown_handle();

    let mut wait = tokio::task::spawn_blocking(move || running.wait());

    tokio::select! {
        res = &mut wait => Ok((res??, false)),
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            handle.trigger();
            Ok((wait.await??, true))
        }
    }
}

fn log_summary(summary: &PipelineSummary) {
    for g in &summary.groups {
        info!(
            "[{}] capacity={} published={} processed={} residual={} conserved={}",
            g.name,
            g.capacity,
            g.published(),
            g.processed(),
            g.residual,
            g.is_conserved()
        );
    }
    info!("pipeline elapsed {:?}", summary.elapsed);
}
