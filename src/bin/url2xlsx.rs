//! CLI binary for url2xlsx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url2xlsx::{
    convert, convert_to_file, validate_url, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, Delimiter, PipelineStage, ProgressCallback, SpreadsheetArtifact,
    Url2XlsxError,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that names the running stage and logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, run_id: &str, url: &str) {
        self.bar.set_message(url.to_string());
        self.bar.println(dim(&format!("run {run_id}")));
    }

    fn on_stage_start(&self, stage: PipelineStage) {
        self.bar.set_prefix(capitalise(&stage.to_string()));
    }

    fn on_stage_complete(&self, stage: PipelineStage, output: &Path) {
        self.bar.println(format!(
            "  {} {:<10}  {}",
            green("✓"),
            stage.to_string(),
            dim(&output.display().to_string())
        ));
    }

    fn on_run_failed(&self, stage: PipelineStage, error: &str) {
        self.bar.finish_and_clear();
        let first_line = error.lines().next().unwrap_or(error);
        eprintln!("  {} {:<10}  {}", red("✗"), stage.to_string(), red(first_line));
    }

    fn on_run_complete(&self, artifact: &SpreadsheetArtifact) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} rows written to sheet \"{}\"",
            green("✔"),
            bold(&artifact.rows.to_string()),
            artifact.sheet_name
        );
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a CSV export; prints the workbook path
  url2xlsx https://example.com/exports/data.csv

  # Gzipped TSV, explicit output file
  url2xlsx https://example.com/exports/data.tsv.gz -o data.xlsx

  # Zip archive, custom sheet name, keep the staging files for inspection
  url2xlsx --sheet-name Orders --keep-staging https://example.com/orders.zip

  # Legacy fixed layout (tmp/ and output/report.xlsx)
  url2xlsx --shared-dirs https://example.com/data.csv

  # JSON result with timings
  url2xlsx --json https://example.com/data.csv > result.json

INPUT HANDLING:
  .gz / .gzip   gunzipped only if the body starts with 1F 8B; otherwise parsed as is
  .zip / .7z    unpacked after every entry name is checked; the first file is the table
  anything else parsed as delimited text (tab if tabs outnumber commas)

ENVIRONMENT VARIABLES:
  Every flag has a URL2XLSX_* equivalent (e.g. URL2XLSX_OUTPUT_DIR).
  RUST_LOG overrides the log filter (e.g. RUST_LOG=url2xlsx=debug).
"#;

/// Download a CSV/TSV file (optionally gzipped or zipped) and convert it to Excel.
#[derive(Parser, Debug)]
#[command(
    name = "url2xlsx",
    version,
    about = "Download a CSV/TSV file (optionally gzipped or zipped) and convert it to Excel",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// HTTP/HTTPS URL of the data file.
    url: String,

    /// Write the workbook to this file instead of the output directory.
    #[arg(short, long, env = "URL2XLSX_OUTPUT")]
    output: Option<PathBuf>,

    /// Root directory for staging downloads.
    #[arg(long, env = "URL2XLSX_STAGING_DIR", default_value = "tmp")]
    staging_dir: PathBuf,

    /// Root directory for generated workbooks.
    #[arg(long, env = "URL2XLSX_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Workbook file name inside the output directory.
    #[arg(long, env = "URL2XLSX_FILENAME", default_value = "report.xlsx")]
    filename: String,

    /// Worksheet name.
    #[arg(long, env = "URL2XLSX_SHEET_NAME", default_value = "Data")]
    sheet_name: String,

    /// Field delimiter.
    #[arg(long, env = "URL2XLSX_DELIMITER", value_enum, default_value = "auto")]
    delimiter: DelimiterArg,

    /// Use the fixed staging dir and output file instead of per-run directories.
    #[arg(long, env = "URL2XLSX_SHARED_DIRS")]
    shared_dirs: bool,

    /// Leave the per-run staging directory on disk.
    #[arg(long, env = "URL2XLSX_KEEP_STAGING")]
    keep_staging: bool,

    /// Overall deadline for the conversion, in seconds.
    #[arg(long, env = "URL2XLSX_TIMEOUT")]
    timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "URL2XLSX_DOWNLOAD_TIMEOUT")]
    download_timeout: Option<u64>,

    /// Output structured JSON (ConversionOutput) instead of the workbook path.
    #[arg(long, env = "URL2XLSX_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "URL2XLSX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "URL2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "URL2XLSX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DelimiterArg {
    Auto,
    Comma,
    Tab,
}

impl From<DelimiterArg> for Delimiter {
    fn from(v: DelimiterArg) -> Self {
        match v {
            DelimiterArg::Auto => Delimiter::Auto,
            DelimiterArg::Comma => Delimiter::Comma,
            DelimiterArg::Tab => Delimiter::Tab,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the per-stage feedback, so INFO logs are muted
    // while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Validate request ─────────────────────────────────────────────────
    let url = match validate_url(&cli.url) {
        Ok(url) => url,
        Err(e) => return report_failure(&cli, &e),
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = match build_config(&cli, progress_cb) {
        Ok(config) => config,
        Err(e) => return report_failure(&cli, &e),
    };

    // ── Run conversion ───────────────────────────────────────────────────
    let run = async {
        match cli.output {
            Some(ref path) => convert_to_file(url.as_str(), path, &config).await,
            None => convert(url.as_str(), &config).await,
        }
    };

    let result = match cli.timeout {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("Conversion did not finish within {secs}s");
                return print_failure(&cli, "timeout", &message);
            }
        },
        None => run.await,
    };

    match result {
        Ok(output) => {
            print_output(&cli, &output, show_progress)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => report_failure(&cli, &e),
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig, Url2XlsxError> {
    let mut builder = ConversionConfig::builder()
        .staging_dir(&cli.staging_dir)
        .output_dir(&cli.output_dir)
        .output_filename(&cli.filename)
        .sheet_name(&cli.sheet_name)
        .delimiter(cli.delimiter.into())
        .isolate_runs(!cli.shared_dirs)
        .keep_staging(cli.keep_staging);

    if let Some(secs) = cli.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build()
}

fn print_output(cli: &Cli, output: &ConversionOutput, show_progress: bool) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    println!("{}", output.artifact.path.display());

    if !cli.quiet && !show_progress {
        eprintln!(
            "Converted {} rows × {} columns ({}, {:?}) in {}ms",
            output.stats.rows,
            output.stats.columns,
            output.stats.delimiter,
            output.stats.extract_kind,
            output.stats.total_duration_ms
        );
    } else if !cli.quiet {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} bytes fetched, {}ms total",
                output.stats.bytes_downloaded, output.stats.total_duration_ms
            ))
        );
    }
    Ok(())
}

fn report_failure(cli: &Cli, error: &Url2XlsxError) -> Result<ExitCode> {
    print_failure(cli, error.kind(), &error.to_string())
}

/// Print a failure as a JSON error object under `--json`, plain text otherwise.
fn print_failure(cli: &Cli, kind: &str, message: &str) -> Result<ExitCode> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&failure_body(kind, message))
                .context("Failed to serialise error")?
        );
    } else {
        eprintln!("{} {}", red("Error:"), message);
    }
    Ok(ExitCode::FAILURE)
}

fn failure_body(kind: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "kind": kind,
            "message": message,
        }
    })
}
