//! # url2xlsx
//!
//! Turn a remote delimited-text file into an Excel workbook.
//!
//! ## Why this crate?
//!
//! Data exports are published as CSV or TSV, often gzipped or zipped, and
//! often mislabelled. This crate downloads one such file, works out what it
//! actually is from its magic bytes rather than trusting the suffix, refuses
//! file and archive entry names that try to escape the staging directory,
//! and writes the table as a one-sheet `.xlsx`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Fetch    stream the body into a per-run staging dir
//!  ├─ 2. Extract  gunzip (magic-checked) / unzip (zip-slip-checked) / pass through
//!  ├─ 3. Parse    infer comma vs. tab, build records keyed by the header row
//!  └─ 4. Write    header + rows into sheet "Data" (spawn_blocking)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use url2xlsx::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert("https://example.com/exports/data.csv.gz", &config).await?;
//!     println!("{} rows → {}", output.artifact.rows, output.artifact.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `url2xlsx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! url2xlsx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, Delimiter};
pub use convert::{convert, convert_sync, convert_to_file, process_url_to_excel};
pub use error::Url2XlsxError;
pub use output::{ConversionOutput, ConversionStats, SpreadsheetArtifact};
pub use pipeline::extract::{ExtractKind, ExtractedFile};
pub use pipeline::fetch::{validate_url, StagedFile};
pub use pipeline::parse::{Record, RecordSet};
pub use progress::{
    ConversionProgressCallback, NoopProgressCallback, PipelineStage, ProgressCallback, RunState,
};
