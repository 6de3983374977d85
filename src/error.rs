//! Error types for the url2xlsx library.
//!
//! Every pipeline stage fails fast with a [`Url2XlsxError`] and the
//! orchestrator hands it back to the caller untouched, so the variant tells
//! you exactly which stage gave up:
//!
//! | Variant        | Raised by            |
//! |----------------|----------------------|
//! | `Fetch`        | download             |
//! | `UnsafePath`   | path guard           |
//! | `Extraction`   | gzip / zip handling  |
//! | `Parse`        | delimited-text parse |
//! | `EmptyData`    | spreadsheet writer   |
//! | `WriteFailed`  | spreadsheet writer   |
//!
//! Callers that need a transport-level mapping (HTTP status, exit code, JSON
//! body) should switch on [`Url2XlsxError::kind`] rather than on the message.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the url2xlsx library.
#[derive(Debug, Error)]
pub enum Url2XlsxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source string is not an absolute HTTP/HTTPS URL.
    #[error("Invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// Network failure, non-2xx status, or the body could not be stored.
    #[error("Failed to download '{url}': {reason}\nCheck the URL and your internet connection.")]
    Fetch { url: String, reason: String },

    // ── Path errors ───────────────────────────────────────────────────────
    /// A user-influenced path would land outside its base directory.
    #[error("Unsafe path '{target}' escapes '{base}' (zip slip attempt)")]
    UnsafePath { base: PathBuf, target: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Archive is unreadable, empty, or the decompression stream failed.
    #[error("Failed to extract '{path}': {detail}")]
    Extraction { path: PathBuf, detail: String },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The text could not be decoded or is not structurally valid CSV/TSV.
    #[error("Failed to parse '{path}': {detail}")]
    Parse { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Zero records reached the spreadsheet writer.
    #[error("No data to write to Excel\nThe source has a header row but no data rows, or is empty.")]
    EmptyData,

    /// The workbook could not be built or saved.
    #[error("Failed to write workbook '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Url2XlsxError {
    /// Stable, machine-readable tag for this error's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::Fetch { .. } => "fetch",
            Self::UnsafePath { .. } => "unsafe_path",
            Self::Extraction { .. } => "extraction",
            Self::Parse { .. } => "parse",
            Self::EmptyData => "empty_data",
            Self::WriteFailed { .. } => "write_failed",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_path_display() {
        let e = Url2XlsxError::UnsafePath {
            base: PathBuf::from("/srv/tmp"),
            target: PathBuf::from("../../evil.csv"),
        };
        let msg = e.to_string();
        assert!(msg.contains("../../evil.csv"), "got: {msg}");
        assert!(msg.contains("/srv/tmp"), "got: {msg}");
    }

    #[test]
    fn fetch_display() {
        let e = Url2XlsxError::Fetch {
            url: "https://example.com/a.csv".into(),
            reason: "HTTP 404 Not Found".into(),
        };
        assert!(e.to_string().contains("404"));
        assert!(e.to_string().contains("example.com"));
    }

    #[test]
    fn empty_data_display() {
        assert!(Url2XlsxError::EmptyData
            .to_string()
            .starts_with("No data to write to Excel"));
    }

    #[test]
    fn kind_tags_are_distinct() {
        let errors = [
            Url2XlsxError::InvalidUrl {
                input: "x".into(),
                reason: "y".into(),
            },
            Url2XlsxError::Fetch {
                url: "x".into(),
                reason: "y".into(),
            },
            Url2XlsxError::UnsafePath {
                base: "a".into(),
                target: "b".into(),
            },
            Url2XlsxError::Extraction {
                path: "a".into(),
                detail: "b".into(),
            },
            Url2XlsxError::Parse {
                path: "a".into(),
                detail: "b".into(),
            },
            Url2XlsxError::EmptyData,
            Url2XlsxError::WriteFailed {
                path: "a".into(),
                detail: "b".into(),
            },
            Url2XlsxError::InvalidConfig("c".into()),
            Url2XlsxError::Internal("d".into()),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }
}
