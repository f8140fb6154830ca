//! batchpress - concurrent batch image compression
//!
//! Walks a directory tree, compresses every supported file with a pool of
//! workers and either mirrors the results into a target tree or replaces the
//! originals in place.

mod display;
mod json_output;
mod progress;

use anyhow::{bail, Context, Result};
use batchpress_config::{Config, ConfigLoader, OutputConfig};
use batchpress_engine::{BatchProcessor, CancellationToken};
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// batchpress - concurrent batch image compression
#[derive(Parser)]
#[command(
    name = "batchpress",
    version = env!("CARGO_PKG_VERSION"),
    about = "Concurrent batch image compression",
    long_about = "batchpress compresses every supported file under a directory tree with a pool\n\
                  of workers. Results go to a mirrored target tree, or replace the originals\n\
                  through a backup, swap and cleanup protocol."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress every supported file under a directory
    Run {
        /// Source directory (overrides scanner.source_directory)
        source: Option<PathBuf>,
        /// Target directory (overrides scanner.target_directory)
        #[arg(short, long)]
        target: Option<PathBuf>,
        /// Replace originals in place
        #[arg(long)]
        replace: bool,
        /// Compression level (10-90)
        #[arg(short, long)]
        level: Option<u8>,
        /// Number of parallel workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Attempts per file
        #[arg(short, long)]
        retries: Option<u32>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
    /// Write a default configuration file
    Init {
        /// Destination of the configuration file
        #[arg(default_value = "batchpress.yaml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Command line overrides for a run
struct RunOverrides {
    source: Option<PathBuf>,
    target: Option<PathBuf>,
    replace: bool,
    level: Option<u8>,
    workers: Option<usize>,
    retries: Option<u32>,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(source) = self.source {
            config.scanner.source_directory = source;
        }
        if let Some(target) = self.target {
            config.scanner.target_directory = target;
        }
        if self.replace {
            config.scanner.replace_original = true;
        }
        if let Some(level) = self.level {
            config.compression.level = level;
        }
        if let Some(workers) = self.workers {
            config.processing.parallel_workers = workers;
        }
        if let Some(retries) = self.retries {
            config.processing.retry_attempts = retries;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => {
            init_command(&path, force)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { default } => {
            let config = if default {
                Config::default()
            } else {
                ConfigLoader::load(cli.config.as_deref())?
            };
            config_command(&config, default)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            source,
            target,
            replace,
            level,
            workers,
            retries,
            json,
        } => {
            let mut config = ConfigLoader::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            RunOverrides {
                source,
                target,
                replace,
                level,
                workers,
                retries,
            }
            .apply(&mut config);

            let _guard = init_logging(cli.debug, cli.quiet, cli.verbose, &config.output)?;
            info!("batchpress v{} starting", env!("CARGO_PKG_VERSION"));

            run_command(config, cli.quiet, json).await
        }
    }
}

fn init_logging(
    debug: bool,
    quiet: bool,
    verbose: bool,
    output: &OutputConfig,
) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let flag_level = if debug {
        Some("debug")
    } else if verbose {
        Some("info")
    } else if quiet {
        Some("error")
    } else {
        None
    };

    let filter = match flag_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&output.log_level))?,
    };

    let (file_layer, guard) = if output.log_to_file {
        let directory = output
            .log_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = output
            .log_file
            .file_name()
            .context("output.log_file has no file name")?;
        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn run_command(config: Config, quiet: bool, json: bool) -> Result<ExitCode> {
    let scanner = config.scanner.clone();
    if !quiet && !json {
        let destination = if scanner.replace_original {
            "in place".to_string()
        } else {
            scanner.target_directory.display().to_string()
        };
        println!(
            "{} Compressing {} → {}",
            style("→").green().bold(),
            style(scanner.source_directory.display()).cyan(),
            style(destination).cyan()
        );
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing files in progress");
            interrupt.cancel();
        }
    });

    let show_progress = config.output.progress_bar && !quiet && !json;
    let renderer = progress::ProgressRenderer::spawn(show_progress);

    let processor = BatchProcessor::new(config)
        .with_sink(renderer.sink())
        .with_cancellation(cancel);
    let result = processor.run().await;
    drop(processor);
    renderer.finish().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if !json {
                display::print_run_error(&e);
            }
            return Err(e).context("Run aborted");
        }
    };

    if json {
        let output = json_output::RunReportJson::from_report(&report, &scanner);
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !quiet {
        display::print_run_summary(&report);
    }

    if report.has_failures() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn config_command(config: &Config, default: bool) -> Result<()> {
    let title = if default {
        "Default configuration:"
    } else {
        "Current configuration:"
    };
    println!("{} {}", style("⚙").blue().bold(), style(title).bold());
    println!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn init_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    ConfigLoader::generate_default_config(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{} Wrote default configuration to {}",
        style("✓").green(),
        style(path.display()).cyan()
    );
    Ok(())
}
