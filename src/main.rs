//! toxnet CLI
//!
//! Classify messages, resample toxicity scores and estimate influence networks.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use toxnet::{
    audit::RunLog,
    classify::Classifier,
    config::{ColumnConfig, Config},
    core::{PivotedMatrix, Resampler, TimeBucketer},
    data::{read_bucket_records, read_messages, read_observations, write_buckets, JsonLinesWriter},
    network::{write_run, GaussianTransferEntropy, OutputPaths, SlidingWindowEstimator},
    perspective::BlockingPerspectiveClient,
    API_KEY_ENV, VERSION,
};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toxnet")]
#[command(version = VERSION)]
#[command(about = "Toxicity influence networks from chat messages", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score messages with the Perspective API
    Classify {
        /// Text file with one message per line, or a CSV file with messages in the first column
        input: PathBuf,

        /// JSON lines file to write the responses to
        output: PathBuf,

        /// API key for Perspective (falls back to PERSPECTIVEKEY, then the config file)
        #[arg(long)]
        key: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Resample scored messages into fixed time buckets
    Resample {
        /// CSV file with one scored message per row
        input: PathBuf,

        /// CSV file to write the buckets to
        output: PathBuf,

        /// Name of the toxicity score column
        #[arg(long)]
        toxicity: Option<String>,

        /// Name of the source column
        #[arg(long)]
        source: Option<String>,

        /// Name of the datetime column
        #[arg(long)]
        datetime: Option<String>,
    },

    /// Estimate influence networks over sliding windows
    Estimate {
        /// CSV file written by `resample`
        input: PathBuf,

        /// Base name for the output files
        output: PathBuf,

        /// Number of samples in each window
        #[arg(long)]
        window_size: usize,

        /// Number of windows to process
        #[arg(long)]
        iterations: usize,

        /// Name of the resampled toxicity column
        #[arg(long)]
        retox: Option<String>,

        /// Name of the source column
        #[arg(long)]
        source: Option<String>,

        /// Name of the datetime column
        #[arg(long)]
        datetime: Option<String>,
    },

    /// Show cumulative run statistics
    Status {
        /// Clear the cumulative statistics
        #[arg(long)]
        reset: bool,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .with_context(|| format!("Failed to load config from {config_path:?}"))?;

    match cli.command {
        Commands::Classify {
            input,
            output,
            key,
            yes,
        } => cmd_classify(&config, &input, &output, key, yes),
        Commands::Resample {
            input,
            output,
            toxicity,
            source,
            datetime,
        } => {
            let columns = config
                .columns
                .clone()
                .with_overrides(toxicity, source, datetime, None);
            cmd_resample(&config, &columns, &input, &output)
        }
        Commands::Estimate {
            input,
            output,
            window_size,
            iterations,
            retox,
            source,
            datetime,
        } => {
            let columns = config
                .columns
                .clone()
                .with_overrides(None, source, datetime, retox);
            cmd_estimate(&config, &columns, &input, &output, window_size, iterations)
        }
        Commands::Status { reset } => cmd_status(&config, reset),
        Commands::Config { save } => cmd_config(&config, &config_path, save),
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::default().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_classify(
    config: &Config,
    input: &Path,
    output: &Path,
    key: Option<String>,
    yes: bool,
) -> Result<()> {
    let messages =
        read_messages(input).with_context(|| format!("Failed to read messages from {input:?}"))?;

    let api_key = resolve_api_key(key, config)?;

    println!("About to send {} messages to Perspective.", messages.len());
    if !yes && !confirm("Type 'yes' to continue: ")? {
        println!("Aborted.");
        return Ok(());
    }

    let client = BlockingPerspectiveClient::new(config.perspective.clone(), api_key)
        .context("Failed to create Perspective client")?;
    let mut sink = JsonLinesWriter::create(output)
        .with_context(|| format!("Failed to create {output:?}"))?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let summary = Classifier::new(running)
        .run(&messages, &client, &mut sink)
        .context("Classification failed")?;
    sink.finish().context("Failed to flush output")?;

    let mut run_log = RunLog::with_persistence(config.run_log_path());
    run_log.record_classification(&summary);
    if !summary.interrupted {
        run_log.record_run_completed();
    }
    run_log.save().context("Failed to save run log")?;

    println!(
        "Wrote {} records to {:?} ({} failed, {} skipped)",
        summary.written(),
        output,
        summary.failed,
        summary.skipped
    );
    if summary.interrupted {
        println!("Interrupted before the last message.");
    }
    Ok(())
}

fn cmd_resample(config: &Config, columns: &ColumnConfig, input: &Path, output: &Path) -> Result<()> {
    let tz = config.resample.timezone()?;
    let observations = read_observations(input, columns, tz)
        .with_context(|| format!("Failed to read observations from {input:?}"))?;

    let resampler = Resampler::new(
        TimeBucketer::new(config.resample.bucket_interval()),
        config.resample.policy(),
    );
    let (buckets, summary) = resampler
        .resample(&observations)
        .context("Resampling failed")?;

    write_buckets(output, &buckets, columns)
        .with_context(|| format!("Failed to write buckets to {output:?}"))?;

    let mut run_log = RunLog::with_persistence(config.run_log_path());
    run_log.record_resample(observations.len(), &summary);
    run_log.record_run_completed();
    run_log.save().context("Failed to save run log")?;

    println!(
        "Resampled {} observations from {} sources into {} buckets ({} missing)",
        observations.len(),
        summary.sources,
        summary.buckets,
        summary.missing
    );
    println!(
        "  Short window: {}, long window: {}",
        summary.short_window, summary.long_window
    );
    println!("Output: {output:?}");
    Ok(())
}

fn cmd_estimate(
    config: &Config,
    columns: &ColumnConfig,
    input: &Path,
    output: &Path,
    window_size: usize,
    iterations: usize,
) -> Result<()> {
    let tz = config.resample.timezone()?;
    let records = read_bucket_records(input, columns, tz)
        .with_context(|| format!("Failed to read buckets from {input:?}"))?;
    let matrix = PivotedMatrix::from_records(&records).context("Failed to pivot buckets")?;
    info!(
        "Pivoted {} rows over {} sources",
        matrix.rows(),
        matrix.columns().len()
    );

    let mut estimator = SlidingWindowEstimator::new(
        GaussianTransferEntropy::new(),
        config.estimation.clone(),
        window_size,
        iterations,
    )?;
    let run = estimator.run(&matrix).context("Estimation failed")?;

    let paths = OutputPaths::new(output, iterations);
    write_run(&run, &paths).context("Failed to write results")?;

    let mut run_log = RunLog::with_persistence(config.run_log_path());
    run_log.record_estimation(run.windows.len());
    run_log.record_run_completed();
    run_log.save().context("Failed to save run log")?;

    for window in &run.windows {
        println!(
            "Window {} [{}..{}): {} rows, {} sources, key {}",
            window.iteration,
            window.begin,
            window.end,
            window.rows,
            window.sources.len(),
            window.key
        );
    }
    println!();
    for path in paths.all() {
        println!("Wrote {path:?}");
    }
    Ok(())
}

fn cmd_status(config: &Config, reset: bool) -> Result<()> {
    println!("toxnet Status");
    println!("=============");
    println!();

    let path = config.run_log_path();
    if !path.exists() {
        println!("No previous run data found.");
        return Ok(());
    }

    let mut run_log = RunLog::with_persistence(path);
    println!("{}", run_log.summary());
    if reset {
        run_log.reset();
        run_log.save().context("Failed to save run log")?;
        println!();
        println!("Statistics cleared.");
    }
    Ok(())
}

fn cmd_config(config: &Config, path: &Path, save: bool) -> Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config
            .save_to(path)
            .with_context(|| format!("Failed to save config to {path:?}"))?;
        println!();
        println!("Saved to {path:?}");
    }
    Ok(())
}

/// API key from the flag, then the environment, then the config file, then stdin.
fn resolve_api_key(flag: Option<String>, config: &Config) -> Result<String> {
    if let Some(key) = flag {
        return Ok(key);
    }
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key);
        }
    }
    if let Some(key) = &config.api_key {
        return Ok(key.clone());
    }

    let key = prompt("Enter API key for Perspective: ")?;
    if key.is_empty() {
        bail!("No API key given (use --key or set {API_KEY_ENV})");
    }
    Ok(key)
}

fn confirm(message: &str) -> Result<bool> {
    Ok(is_confirmation(&prompt(message)?))
}

fn is_confirmation(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
