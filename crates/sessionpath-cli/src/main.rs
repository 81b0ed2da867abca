//! SessionPath command line
//!
//! ```text
//! sessionpath run --input logs/ --output out/ --geo geo.jsonl
//! sessionpath validate-config --config sessionpath.yaml
//! ```

mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use config::AppConfig;
use sessionpath_geo::{GeoEnricher, GeoTable};
use sessionpath_ingress::scan_inputs;
use sessionpath_observability::JobMetrics;
use sessionpath_pipeline::{CancelToken, JobRunner};
use sessionpath_storage::{AtomicWriter, JsonlOutput, prepare_output_dir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SessionPath - rebuild per-session action paths from raw event logs
#[derive(Parser)]
#[command(name = "sessionpath", version)]
#[command(about = "Rebuild per-session action paths from raw event logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "SESSIONPATH_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job over raw log files
    Run {
        /// Input files or directories (scanned recursively)
        #[arg(short, long = "input", value_name = "PATH", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output directory for part-r-*.jsonl files
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// IP range dataset (JSON lines)
        #[arg(short, long, value_name = "FILE")]
        geo: Option<PathBuf>,

        /// Number of reduce partitions
        #[arg(short, long)]
        partitions: Option<usize>,

        /// Refuse to run if the output directory is not empty
        #[arg(long)]
        no_overwrite: bool,

        /// Write Prometheus metrics here after the run
        #[arg(long, value_name = "FILE")]
        metrics_file: Option<PathBuf>,
    },
    /// Check a configuration file and print the effective settings
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    // Merge environment variables (they override config file)
    config.merge_env();

    match cli.command {
        Commands::ValidateConfig => {
            if cli.config.is_none() {
                bail!("validate-config needs --config <FILE>");
            }
            config.validate()?;
            println!("{}", serde_yaml::to_string(&config)?);
            println!("Configuration OK");
            Ok(())
        }
        Commands::Run {
            inputs,
            output,
            geo,
            partitions,
            no_overwrite,
            metrics_file,
        } => {
            // CLI flags have the highest precedence
            if let Some(output) = output {
                config.output_dir = Some(output);
            }
            if let Some(geo) = geo {
                config.geo_dataset = Some(geo);
            }
            if let Some(partitions) = partitions {
                config.job.partitions = partitions;
            }
            if no_overwrite {
                config.overwrite_output = false;
            }
            if let Some(metrics_file) = metrics_file {
                config.metrics_file = Some(metrics_file);
            }
            config.validate()?;

            init_tracing(&config.logging.level)?;
            run(config, inputs).await
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(config: AppConfig, inputs: Vec<PathBuf>) -> Result<()> {
    let output_dir = config
        .output_dir
        .clone()
        .context("No output directory (use --output or output_dir)")?;
    let geo_path = config
        .geo_dataset
        .clone()
        .context("No geolocation dataset (use --geo or geo_dataset)")?;

    let table = GeoTable::load(&geo_path)?;
    let enricher = GeoEnricher::new(Arc::new(table));

    let sources = scan_inputs(&inputs).await?;
    if sources.is_empty() {
        warn!("No input files found");
    }
    info!(
        sources = sources.len(),
        output = %output_dir.display(),
        "Inputs discovered"
    );

    prepare_output_dir(&output_dir, config.overwrite_output)?;

    let metrics = JobMetrics::new()?;
    let runner = JobRunner::new(
        config.job.clone(),
        enricher,
        Arc::new(JsonlOutput::new(&output_dir)),
        metrics.clone(),
    )?;

    let cancel = CancelToken::new();
    let signal_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    let result = runner.run(sources, &cancel).await;
    signal_task.abort();

    if let Some(path) = &config.metrics_file {
        if let Err(e) = write_metrics(&metrics, path) {
            error!(path = %path.display(), error = %e, "Failed to write metrics");
        }
    }

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn write_metrics(metrics: &JobMetrics, path: &Path) -> Result<()> {
    let text = metrics.render()?;
    let mut writer = AtomicWriter::new(path)?;
    writer.write(text.as_bytes())?;
    writer.commit()?;
    info!(path = %path.display(), "Metrics written");
    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, cancelling job");
}
