//! Conversion entry points: run the four pipeline stages for one URL.
//!
//! Every invocation gets a UUID v4 run id. With `isolate_runs` (the default)
//! staging happens in a fresh `run-*` directory under `staging_dir` that is
//! removed off the async workers when the run ends, success or not, and the
//! workbook lands in
//! `output_dir/<run_id>/`. Concurrent runs therefore never share a path.
//! With `isolate_runs = false` the fixed `staging_dir` and
//! `output_dir/<output_filename>` are used directly and staging files stay
//! behind.

use crate::config::ConversionConfig;
use crate::error::Url2XlsxError;
use crate::output::{ConversionOutput, ConversionStats, SpreadsheetArtifact};
use crate::pipeline::{extract, fetch, parse, write};
use crate::progress::{PipelineStage, ProgressCallback, RunState};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Fetch `url`, extract it, parse it and write it as a workbook.
///
/// Stages run strictly in order and the first error ends the run; it is
/// returned exactly as the failing stage produced it.
///
/// # Errors
/// - [`Url2XlsxError::Fetch`]: bad URL, network failure or non-2xx status
/// - [`Url2XlsxError::UnsafePath`]: a file or archive entry name escapes staging
/// - [`Url2XlsxError::Extraction`]: corrupt gzip, unreadable or empty archive
/// - [`Url2XlsxError::Parse`]: non-UTF-8 text or malformed rows
/// - [`Url2XlsxError::EmptyData`]: no data rows
/// - [`Url2XlsxError::WriteFailed`]: the workbook could not be saved
pub async fn convert(
    url: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Url2XlsxError> {
    run(url.as_ref(), config, None).await
}

/// Run the pipeline and return only the workbook path.
pub async fn process_url_to_excel(
    url: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<PathBuf, Url2XlsxError> {
    let output = convert(url, config).await?;
    Ok(output.artifact.path)
}

/// Run the pipeline and write the workbook to `output_path` instead of the
/// configured output directory. Staging is still governed by `config`.
pub async fn convert_to_file(
    url: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Url2XlsxError> {
    run(url.as_ref(), config, Some(output_path.as_ref())).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    url: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Url2XlsxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Url2XlsxError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(url, config))
}

/// Where the workbook for `run_id` goes when no explicit path is given.
pub fn default_output_path(config: &ConversionConfig, run_id: &str) -> PathBuf {
    if config.isolate_runs {
        config.output_dir.join(run_id).join(&config.output_filename)
    } else {
        config.output_dir.join(&config.output_filename)
    }
}

async fn run(
    url: &str,
    config: &ConversionConfig,
    output_path: Option<&Path>,
) -> Result<ConversionOutput, Url2XlsxError> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("pipeline", run_id = %run_id);

    async {
        let total_start = Instant::now();
        info!("Starting conversion: {}", url);

        let output_path = output_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(config, &run_id));

        let mut tracker = RunTracker::new(config.progress_callback.as_ref());
        tracker.start(&run_id, url);

        match run_stages(url, config, &output_path, &mut tracker).await {
            Ok((artifact, mut stats)) => {
                stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
                tracker.finish(&artifact);
                info!(
                    "Conversion complete: {} rows → {} ({}ms)",
                    artifact.rows,
                    artifact.path.display(),
                    stats.total_duration_ms
                );
                Ok(ConversionOutput {
                    run_id: run_id.clone(),
                    state: tracker.state,
                    artifact,
                    stats,
                })
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run_stages(
    url: &str,
    config: &ConversionConfig,
    output_path: &Path,
    tracker: &mut RunTracker<'_>,
) -> Result<(SpreadsheetArtifact, ConversionStats), Url2XlsxError> {
    tracker.begin(PipelineStage::Fetching);
    let staging = Staging::create(config, url).await?;
    let result = run_in_staging(url, config, staging.path(), output_path, tracker).await;
    staging.close().await;
    result
}

async fn run_in_staging(
    url: &str,
    config: &ConversionConfig,
    staging_dir: &Path,
    output_path: &Path,
    tracker: &mut RunTracker<'_>,
) -> Result<(SpreadsheetArtifact, ConversionStats), Url2XlsxError> {
    let mut stats = ConversionStats::default();

    // ── Fetch ────────────────────────────────────────────────────────────
    let started = Instant::now();
    let staged = fetch::download(url, staging_dir, config).await?;
    stats.fetch_duration_ms = started.elapsed().as_millis() as u64;
    stats.bytes_downloaded = staged.bytes;
    tracker.complete(PipelineStage::Fetching, &staged.path);

    // ── Extract ──────────────────────────────────────────────────────────
    tracker.begin(PipelineStage::Extracting);
    let started = Instant::now();
    let extracted = extract::extract_staged(&staged).await?;
    stats.extract_duration_ms = started.elapsed().as_millis() as u64;
    stats.extract_kind = extracted.kind;
    tracker.complete(PipelineStage::Extracting, &extracted.path);

    // ── Parse ────────────────────────────────────────────────────────────
    tracker.begin(PipelineStage::Parsing);
    let started = Instant::now();
    let records = parse::parse(&extracted.path, config.delimiter).await?;
    stats.parse_duration_ms = started.elapsed().as_millis() as u64;
    stats.delimiter = records.delimiter_name().to_string();
    stats.rows = records.len();
    stats.columns = records.headers().len();
    tracker.complete(PipelineStage::Parsing, &extracted.path);

    // ── Write ────────────────────────────────────────────────────────────
    tracker.begin(PipelineStage::Writing);
    let started = Instant::now();
    let artifact = write::write(&records, output_path, &config.sheet_name).await?;
    stats.write_duration_ms = started.elapsed().as_millis() as u64;
    tracker.complete(PipelineStage::Writing, &artifact.path);

    Ok((artifact, stats))
}

/// The staging directory of one run.
enum Staging {
    /// Per-run directory; removed by [`Staging::close`] unless `keep` is set.
    Scoped { dir: TempDir, keep: bool },
    /// The configured directory itself, shared by every run.
    Shared(PathBuf),
}

impl Staging {
    async fn create(config: &ConversionConfig, url: &str) -> Result<Self, Url2XlsxError> {
        let root = &config.staging_dir;
        let fetch_err = |reason: String| Url2XlsxError::Fetch {
            url: url.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| fetch_err(format!("cannot create staging root '{}': {e}", root.display())))?;

        if !config.isolate_runs {
            return Ok(Staging::Shared(root.clone()));
        }

        let dir = tempfile::Builder::new()
            .prefix("run-")
            .keep(config.keep_staging)
            .tempdir_in(root)
            .map_err(|e| fetch_err(format!("cannot create staging dir in '{}': {e}", root.display())))?;
        debug!("Staging in {}", dir.path().display());
        Ok(Staging::Scoped {
            dir,
            keep: config.keep_staging,
        })
    }

    fn path(&self) -> &Path {
        match self {
            Staging::Scoped { dir, .. } => dir.path(),
            Staging::Shared(path) => path,
        }
    }

    /// Remove a per-run directory on the blocking pool. Cleanup failures are
    /// logged, not returned.
    async fn close(self) {
        match self {
            Staging::Scoped { dir, keep: false } => {
                let path = dir.path().to_path_buf();
                match tokio::task::spawn_blocking(move || dir.close()).await {
                    Ok(Ok(())) => debug!("Removed staging {}", path.display()),
                    Ok(Err(e)) => warn!("Failed to remove staging {}: {}", path.display(), e),
                    Err(e) => warn!("Staging cleanup task panicked: {}", e),
                }
            }
            // Built with `keep(true)`, so dropping leaves it on disk.
            Staging::Scoped { dir, keep: true } => {
                info!("Keeping staging {}", dir.path().display());
            }
            Staging::Shared(_) => {}
        }
    }
}

/// Drives [`RunState`] and forwards transitions to the progress callback.
struct RunTracker<'a> {
    state: RunState,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> RunTracker<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            state: RunState::Idle,
            callback,
        }
    }

    fn start(&self, run_id: &str, url: &str) {
        if let Some(cb) = self.callback {
            cb.on_run_start(run_id, url);
        }
    }

    fn begin(&mut self, stage: PipelineStage) {
        debug_assert_eq!(self.state.next(), RunState::from(stage));
        self.state = stage.into();
        debug!("Stage started: {}", stage);
        if let Some(cb) = self.callback {
            cb.on_stage_start(stage);
        }
    }

    fn complete(&self, stage: PipelineStage, output: &Path) {
        debug!("Stage complete: {} → {}", stage, output.display());
        if let Some(cb) = self.callback {
            cb.on_stage_complete(stage, output);
        }
    }

    fn finish(&mut self, artifact: &SpreadsheetArtifact) {
        self.state = self.state.next();
        if let Some(cb) = self.callback {
            cb.on_run_complete(artifact);
        }
    }

    fn fail(&mut self, error: &Url2XlsxError) {
        let stage = self.state.stage().unwrap_or(PipelineStage::Fetching);
        self.state = RunState::Failed;
        warn!("Conversion failed during {}: {}", stage, error);
        if let Some(cb) = self.callback {
            cb.on_run_failed(stage, &error.to_string());
        }
    }
}
