//! APM Bridge CLI
//!
//! Command-line interface for running exports in-process and probing a
//! running APM Bridge API server.
//!
//! # Usage
//!
//! ```bash
//! apm-bridge --help
//! apm-bridge traces --start-time 60000
//! apm-bridge metrics --dry-run
//! apm-bridge health
//! ```

#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::config::ExportConfig;
use shared::pipeline::Exporter;
use shared::sink::{InMemorySink, TelemetrySink};
use shared::telemetry::{TelemetryConfig, TelemetryGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// APM Bridge CLI - re-emit upstream traces and metrics as OpenTelemetry
#[derive(Debug, Parser)]
#[command(name = "apm-bridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API server URL
    #[arg(
        short,
        long,
        env = "APM_BRIDGE_API_URL",
        default_value = "http://localhost:8080"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export traces of the lookback window
    Traces {
        /// Lookback window in milliseconds (defaults to TRACE_WINDOW_MS)
        #[arg(short, long)]
        start_time: Option<u64>,

        /// Record emissions in memory instead of exporting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Export infrastructure metrics of the lookback window
    Metrics {
        /// Lookback window in milliseconds (defaults to METRICS_WINDOW_MS)
        #[arg(short, long)]
        start_time: Option<u64>,

        /// Record emissions in memory instead of exporting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Check API server health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Traces {
            start_time,
            dry_run,
        }) => run_export(ExportKind::Traces, start_time, dry_run).await,
        Some(Commands::Metrics {
            start_time,
            dry_run,
        }) => run_export(ExportKind::Metrics, start_time, dry_run).await,
        Some(Commands::Health) => check_health(&cli.api_url).await,
        None => {
            println!("APM Bridge CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportKind {
    Traces,
    Metrics,
}

async fn run_export(kind: ExportKind, start_time: Option<u64>, dry_run: bool) -> Result<()> {
    let config = ExportConfig::from_env()?;

    let memory = InMemorySink::new();
    let telemetry = if dry_run {
        None
    } else {
        Some(TelemetryGuard::init(&TelemetryConfig::from_env()?)?)
    };
    let sink: Arc<dyn TelemetrySink> = match &telemetry {
        Some(guard) => Arc::new(
            guard
                .sink()
                .context("Telemetry providers are not available")?,
        ),
        None => Arc::new(memory.clone()),
    };

    let exporter = Exporter::from_config(&config, sink)?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling export");
            on_interrupt.cancel();
        }
    });

    let windows = exporter.windows();
    match kind {
        ExportKind::Traces => {
            let window_ms = start_time.unwrap_or(windows.traces_ms);
            let summary = exporter.export_traces(window_ms, &cancel).await?;
            print_json(&summary)?;
        }
        ExportKind::Metrics => {
            let window_ms = start_time.unwrap_or(windows.metrics_ms);
            let summary = exporter
                .export_infrastructure_metrics(window_ms, &cancel)
                .await?;
            print_json(&summary)?;
        }
    }

    if dry_run {
        tracing::info!(
            spans = memory.span_count(),
            samples = memory.sample_count(),
            "Dry run recorded emissions"
        );
    }
    if let Some(guard) = telemetry {
        guard.shutdown()?;
    }
    Ok(())
}

async fn check_health(api_url: &str) -> Result<()> {
    let url = format!("{}/health", api_url.trim_end_matches('/'));
    println!("Checking health of APM Bridge API at {url}...");

    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("Health endpoint returned malformed JSON")?;
    if !status.is_success() {
        bail!("Health check failed with status {status}: {body}");
    }

    print_json(&body)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
