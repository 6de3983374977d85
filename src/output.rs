//! Result types returned by the conversion entry points.

use crate::pipeline::extract::ExtractKind;
use crate::progress::RunState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The workbook produced by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetArtifact {
    /// Location of the `.xlsx` file.
    pub path: PathBuf,
    /// Name of the single worksheet.
    pub sheet_name: String,
    /// Header row, in source order.
    pub columns: Vec<String>,
    /// Number of data rows (header excluded).
    pub rows: usize,
}

/// Timing and shape figures for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Bytes of response body written to staging.
    pub bytes_downloaded: u64,
    /// How the staged file was turned into text.
    pub extract_kind: ExtractKind,
    /// `"comma"` or `"tab"`.
    pub delimiter: String,
    pub rows: usize,
    pub columns: usize,
    pub fetch_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub parse_duration_ms: u64,
    pub write_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a successful run reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Unique id of this invocation; names its isolated directories.
    pub run_id: String,
    /// Always [`RunState::Done`] for a returned output.
    pub state: RunState,
    pub artifact: SpreadsheetArtifact,
    pub stats: ConversionStats,
}
