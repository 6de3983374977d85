//! Run states and the progress-callback trait for stage events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe a
//! run as it moves through its stages:
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Extracting ─▶ Parsing ─▶ Writing ─▶ Done
//!            │            │            │           │
//!            └────────────┴─────┬──────┴───────────┘
//!                               ▼
//!                             Failed
//! ```
//!
//! `Failed` is terminal and reached on the first error. There is no retry: a
//! failed run is restarted with a fresh invocation.
//!
//! # Example
//!
//! ```rust
//! use url2xlsx::{ConversionConfig, ConversionProgressCallback, PipelineStage};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct StageLogger;
//!
//! impl ConversionProgressCallback for StageLogger {
//!     fn on_stage_complete(&self, stage: PipelineStage, output: &Path) {
//!         eprintln!("{stage} done → {}", output.display());
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(StageLogger))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::SpreadsheetArtifact;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One of the four sequential pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Fetching,
    Extracting,
    Parsing,
    Writing,
}

impl PipelineStage {
    /// Stages in execution order.
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Fetching,
        PipelineStage::Extracting,
        PipelineStage::Parsing,
        PipelineStage::Writing,
    ];
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Fetching => "fetching",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Parsing => "parsing",
            PipelineStage::Writing => "writing",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a single pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Fetching,
    Extracting,
    Parsing,
    Writing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// The stage this state is executing, if any.
    pub fn stage(self) -> Option<PipelineStage> {
        match self {
            RunState::Fetching => Some(PipelineStage::Fetching),
            RunState::Extracting => Some(PipelineStage::Extracting),
            RunState::Parsing => Some(PipelineStage::Parsing),
            RunState::Writing => Some(PipelineStage::Writing),
            RunState::Idle | RunState::Done | RunState::Failed => None,
        }
    }

    /// The state that follows a successful step out of `self`.
    ///
    /// Terminal states map to themselves.
    pub fn next(self) -> RunState {
        match self {
            RunState::Idle => RunState::Fetching,
            RunState::Fetching => RunState::Extracting,
            RunState::Extracting => RunState::Parsing,
            RunState::Parsing => RunState::Writing,
            RunState::Writing => RunState::Done,
            RunState::Done => RunState::Done,
            RunState::Failed => RunState::Failed,
        }
    }
}

impl From<PipelineStage> for RunState {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Fetching => RunState::Fetching,
            PipelineStage::Extracting => RunState::Extracting,
            PipelineStage::Parsing => RunState::Parsing,
            PipelineStage::Writing => RunState::Writing,
        }
    }
}

/// Called by the pipeline as a run moves through its stages.
///
/// Implementations must be `Send + Sync`: independent runs may share one
/// callback and execute on different Tokio worker threads. All methods have
/// default no-op implementations so callers only override what they care
/// about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the fetch stage starts.
    fn on_run_start(&self, run_id: &str, url: &str) {
        let _ = (run_id, url);
    }

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// Called when a stage finishes; `output` is the path it handed on.
    fn on_stage_complete(&self, stage: PipelineStage, output: &Path) {
        let _ = (stage, output);
    }

    /// Called once when `stage` fails; the run is now `Failed`.
    fn on_run_failed(&self, stage: PipelineStage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once after the workbook has been written.
    fn on_run_complete(&self, artifact: &SpreadsheetArtifact) {
        let _ = artifact;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
