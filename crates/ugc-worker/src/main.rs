//! Worker binary: runs the job request files given on the command line.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ugc_models::JobRequest;
use ugc_worker::{Cli, JobExecutor, JobPipeline, JobStatus, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = WorkerConfig::from_env();
    cli.apply(&mut config);
    init_tracing(config.json_logs)?;

    info!("Starting ugc-worker");
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Metrics endpoint listening");
    }

    let mut requests = Vec::with_capacity(cli.jobs.len());
    for path in &cli.jobs {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        let request: JobRequest = serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid job file {}", path.display()))?;
        requests.push(request);
    }

    let pipeline = JobPipeline::new(config);
    if !pipeline.overlay_enabled() {
        warn!("No speech model configured, product overlays will be skipped");
    }
    let executor = Arc::new(JobExecutor::new(pipeline));

    // Setup signal handler
    let signal_executor = Arc::clone(&executor);
    let shutdown_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping after the current stage");
            signal_executor.shutdown();
        }
    });

    let summaries = executor.run_all(requests).await;
    shutdown_handle.abort();

    let mut failed = 0;
    for summary in &summaries {
        println!("{}", serde_json::to_string(summary)?);
        if summary.status != JobStatus::Succeeded {
            failed += 1;
        }
    }

    info!(jobs = summaries.len(), failed, "Worker shutdown complete");
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Colored output for dev, JSON for production.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("ugc_worker=info".parse()?)
        .add_directive("ugc_media=info".parse()?)
        .add_directive("whisper_rs=warn".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
