//! Command line definition and the `download` / `list` commands

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info};

use super::CliError;
use crate::downloader::config::{ARCHIVE_BASE_URL, API_BASE_URL, DEFAULT_BATCH_SIZE, MAX_RETRIES};
use crate::downloader::{BatchReport, DownloadJob, DownloaderConfig, ErrorPolicy, RunContext};
use crate::resume::RunLock;
use crate::shutdown::SharedShutdown;

/// Largest accepted batch size
const MAX_BATCH_SIZE: usize = 256;

/// Try to parse datetime from RFC3339 format
///
/// Inputs without a timezone designator are taken as UTC.
fn try_parse_datetime_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Parse a YYYY-MM-DD date (start of day, UTC) or an RFC3339 datetime.
fn parse_date_flexible(input: &str, what: &str) -> Result<DateTime<Utc>, CliError> {
    if let Some(dt) = try_parse_datetime_rfc3339(input) {
        return Ok(dt);
    }

    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid {what}: {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid {what}")))?;
    Ok(datetime.and_utc())
}

/// Parse and validate a batch size
fn parse_batch_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("batch size must be at least 1".to_string());
    }
    if value > MAX_BATCH_SIZE {
        return Err(format!(
            "batch size {value} exceeds maximum of {MAX_BATCH_SIZE}"
        ));
    }
    Ok(value)
}

/// Bybit bulk downloader CLI
#[derive(Parser, Debug)]
#[command(name = "bybit-bulk-downloader")]
#[command(about = "Bulk-download Bybit historical market data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Files downloaded concurrently per batch
    #[arg(long, global = true, default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// Retries for connection errors, 429 and 5xx responses
    #[arg(long, global = true, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Abort after the first batch with a failed task
    #[arg(long, global = true, default_value_t = false)]
    pub fail_fast: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9898)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Base URL of the archive file server
    #[arg(long, global = true, default_value = ARCHIVE_BASE_URL)]
    pub base_url: String,

    /// Base URL of the REST API
    #[arg(long, global = true, default_value = API_BASE_URL)]
    pub api_base_url: String,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one data type into a destination directory
    Download(DownloadArgs),

    /// Print the archive URLs of a data type without downloading them
    List(ListArgs),
}

/// Arguments of the `download` command
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Destination root; data lands below `bybit_data/`
    pub destination_dir: PathBuf,

    /// trading, premium_index, spot_index, kline_for_metatrader4, spot,
    /// fundingRate or klines
    #[arg(long)]
    pub data_type: String,

    /// Kline category: linear, inverse or spot
    #[arg(long, default_value = "linear")]
    pub category: String,

    /// Kline interval: 1, 3, 5, 15, 30, 60, 120, 240, 360, 720, D, W or M
    #[arg(long, default_value = "1")]
    pub interval: String,

    /// Restrict API data types to these symbols (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Start of API history (YYYY-MM-DD or RFC3339), default 2018-01-01
    #[arg(long)]
    pub start_date: Option<String>,

    /// End of API history (YYYY-MM-DD or RFC3339), default now
    #[arg(long)]
    pub end_date: Option<String>,
}

/// Arguments of the `list` command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Archive data type to list
    #[arg(long)]
    pub data_type: String,
}

/// Output format options
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl Cli {
    fn base_config(&self, destination_dir: PathBuf) -> DownloaderConfig {
        let policy = if self.fail_fast {
            ErrorPolicy::FailFast
        } else {
            ErrorPolicy::Continue
        };
        DownloaderConfig::new(destination_dir)
            .with_archive_base_url(&self.base_url)
            .with_api_base_url(&self.api_base_url)
            .with_batch_size(self.batch_size)
            .with_max_retries(self.max_retries)
            .with_error_policy(policy)
    }
}

impl DownloadArgs {
    /// Resolve the job and its configuration. No I/O happens here.
    pub fn resolve(&self, cli: &Cli) -> Result<(DownloadJob, DownloaderConfig), CliError> {
        let job = DownloadJob::parse(&self.data_type, &self.category, &self.interval)?;

        let mut config = cli
            .base_config(self.destination_dir.clone())
            .with_symbols(self.symbols.clone());

        if self.start_date.is_some() || self.end_date.is_some() {
            let start = match &self.start_date {
                Some(s) => parse_date_flexible(s, "start date")?,
                None => config.history_start,
            };
            let end = self
                .end_date
                .as_deref()
                .map(|s| parse_date_flexible(s, "end date"))
                .transpose()?;
            if let Some(end) = end {
                if end <= start {
                    return Err(CliError::InvalidArgument(format!(
                        "end date {end} is not after start date {start}"
                    )));
                }
            }
            config = config.with_history(start, end);
        }

        Ok((job, config))
    }

    /// Run the download
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<BatchReport, CliError> {
        let (job, config) = self.resolve(cli)?;

        let mut lock = RunLock::open(&config.destination_dir)?;
        let _guard = lock.try_acquire()?;

        let progress = create_progress_bar(&job);
        let ctx = RunContext::with_defaults(config)
            .with_shutdown(shutdown)
            .with_progress(progress.clone());

        let result = job.run(&ctx).await;
        progress.finish_and_clear();

        match cli.output_format {
            OutputFormat::Json => output_json(&job, &result),
            OutputFormat::Human => output_human(&job, &result),
        }

        let report = result?;
        if !report.is_success() {
            return Err(CliError::TasksFailed {
                failed: report.failed,
                total: report.total(),
            });
        }
        Ok(report)
    }
}

impl ListArgs {
    /// Print every archive URL of the data type
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let job = DownloadJob::parse(&self.data_type, "linear", "1")?;
        let ctx = RunContext::with_defaults(cli.base_config(PathBuf::new())).with_shutdown(shutdown);

        let Some(urls) = job.list_files(&ctx).await? else {
            return Err(CliError::InvalidArgument(format!(
                "{} is served by the REST API and has no archive listing",
                job.data_type()
            )));
        };

        info!("{} files listed for {}", urls.len(), job.data_type());
        match cli.output_format {
            OutputFormat::Json => println!("{}", serde_json::json!(urls)),
            OutputFormat::Human => {
                for url in urls {
                    println!("{url}");
                }
            }
        }
        Ok(())
    }
}

fn output_json(job: &DownloadJob, result: &Result<BatchReport, crate::downloader::DownloadError>) {
    let output = match result {
        Ok(report) => serde_json::json!({
            "success": report.is_success(),
            "job": job.to_string(),
            "data_type": job.data_type().as_str(),
            "completed": report.completed,
            "skipped": report.skipped,
            "no_data": report.no_data,
            "failed": report.failed,
            "failures": report.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }),
        Err(e) => serde_json::json!({
            "success": false,
            "job": job.to_string(),
            "data_type": job.data_type().as_str(),
            "error": e.to_string(),
        }),
    };
    println!("{output}");
}

fn output_human(job: &DownloadJob, result: &Result<BatchReport, crate::downloader::DownloadError>) {
    match result {
        Ok(report) => {
            println!("\nDownload of {job} finished");
            println!("Completed: {}", report.completed);
            println!("Skipped (already present): {}", report.skipped);
            if report.no_data > 0 {
                println!("Without data: {}", report.no_data);
            }
            if report.failed > 0 {
                eprintln!("Failed: {}", report.failed);
                for failure in &report.failures {
                    eprintln!("  {failure}");
                }
            }
        }
        Err(e) => {
            eprintln!("\nDownload of {job} failed!");
            eprintln!("Error: {e}");
            error!("Download failed: {}", e);
        }
    }
}

/// Run-level progress bar; its length is set once the work is enumerated.
fn create_progress_bar(job: &DownloadJob) -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Downloading {job}"));
    pb
}
