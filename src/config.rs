//! Configuration types for URL-to-workbook conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The defaults reproduce the classic
//! layout (`tmp/` for staging, `output/report.xlsx` for the result) but with
//! every run isolated in its own subdirectory, so concurrent conversions never
//! overwrite each other's files.

use crate::error::Url2XlsxError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Characters Excel refuses in worksheet names.
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Configuration for a URL-to-workbook conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use url2xlsx::{ConversionConfig, Delimiter};
///
/// let config = ConversionConfig::builder()
///     .staging_dir("/var/tmp/url2xlsx")
///     .output_filename("sales.xlsx")
///     .delimiter(Delimiter::Tab)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Root directory for downloaded and extracted files. Default: `tmp`.
    pub staging_dir: PathBuf,

    /// Root directory for generated workbooks. Default: `output`.
    pub output_dir: PathBuf,

    /// File name of the generated workbook. Default: `report.xlsx`.
    pub output_filename: String,

    /// Name of the single worksheet. Default: `Data`.
    pub sheet_name: String,

    /// Delimiter selection for the parse stage. Default: [`Delimiter::Auto`].
    pub delimiter: Delimiter,

    /// Give every run its own staging and output subdirectory. Default: true.
    ///
    /// With `false`, every run stages straight into `staging_dir` and writes
    /// `output_dir/output_filename`; two simultaneous runs then race on the
    /// same files.
    pub isolate_runs: bool,

    /// Keep the per-run staging directory after the run. Default: false.
    ///
    /// Only meaningful with `isolate_runs`; shared staging is never removed.
    pub keep_staging: bool,

    /// Per-request HTTP timeout in seconds. Default: None (no timeout).
    pub download_timeout_secs: Option<u64>,

    /// `User-Agent` header sent with the download request.
    pub user_agent: String,

    /// Receives run and stage transitions. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("tmp"),
            output_dir: PathBuf::from("output"),
            output_filename: "report.xlsx".to_string(),
            sheet_name: "Data".to_string(),
            delimiter: Delimiter::default(),
            isolate_runs: true,
            keep_staging: false,
            download_timeout_secs: None,
            user_agent: format!("url2xlsx/{}", env!("CARGO_PKG_VERSION")),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("staging_dir", &self.staging_dir)
            .field("output_dir", &self.output_dir)
            .field("output_filename", &self.output_filename)
            .field("sheet_name", &self.sheet_name)
            .field("delimiter", &self.delimiter)
            .field("isolate_runs", &self.isolate_runs)
            .field("keep_staging", &self.keep_staging)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn output_filename(mut self, name: impl Into<String>) -> Self {
        self.config.output_filename = name.into();
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.config.sheet_name = name.into();
        self
    }

    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn isolate_runs(mut self, v: bool) -> Self {
        self.config.isolate_runs = v;
        self
    }

    pub fn keep_staging(mut self, v: bool) -> Self {
        self.config.keep_staging = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = Some(secs);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Url2XlsxError> {
        let c = &self.config;
        validate_sheet_name(&c.sheet_name)?;
        validate_output_filename(&c.output_filename)?;
        if c.download_timeout_secs == Some(0) {
            return Err(Url2XlsxError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

fn validate_sheet_name(name: &str) -> Result<(), Url2XlsxError> {
    let len = name.chars().count();
    if len == 0 || len > 31 {
        return Err(Url2XlsxError::InvalidConfig(format!(
            "Sheet name must be 1–31 characters, got {len}"
        )));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_SHEET_CHARS.contains(c)) {
        return Err(Url2XlsxError::InvalidConfig(format!(
            "Sheet name '{name}' contains forbidden character '{ch}'"
        )));
    }
    Ok(())
}

fn validate_output_filename(name: &str) -> Result<(), Url2XlsxError> {
    let path = Path::new(name);
    let single_component = path.components().count() == 1 && path.file_name().is_some();
    if !single_component {
        return Err(Url2XlsxError::InvalidConfig(format!(
            "Output filename '{name}' must be a plain file name, not a path"
        )));
    }
    let is_xlsx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        return Err(Url2XlsxError::InvalidConfig(format!(
            "Output filename '{name}' must end in .xlsx"
        )));
    }
    Ok(())
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the parse stage picks the field delimiter.
///
/// `Auto` counts tab and comma characters over the whole text and picks tab
/// only when tabs strictly outnumber commas. The count is not quote-aware: a
/// comma-separated file whose quoted fields contain many tabs can be
/// misdetected. Force `Comma` or `Tab` when the format is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Count-based inference. (default)
    #[default]
    Auto,
    /// Always `,`.
    Comma,
    /// Always `\t`.
    Tab,
}

impl Delimiter {
    /// The concrete delimiter byte for `text`, resolving `Auto` by counting.
    pub fn resolve(self, text: &str) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Auto => {
                let (tabs, commas) = text.bytes().fold((0usize, 0usize), |(t, c), b| match b {
                    b'\t' => (t + 1, c),
                    b',' => (t, c + 1),
                    _ => (t, c),
                });
                if tabs > commas {
                    b'\t'
                } else {
                    b','
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_layout() {
        let c = ConversionConfig::default();
        assert_eq!(c.staging_dir, PathBuf::from("tmp"));
        assert_eq!(c.output_dir, PathBuf::from("output"));
        assert_eq!(c.output_filename, "report.xlsx");
        assert_eq!(c.sheet_name, "Data");
        assert!(c.isolate_runs);
        assert!(!c.keep_staging);
        assert!(c.download_timeout_secs.is_none());
    }

    #[test]
    fn builder_rejects_bad_sheet_names() {
        assert!(ConversionConfig::builder().sheet_name("").build().is_err());
        assert!(ConversionConfig::builder()
            .sheet_name("a".repeat(32))
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .sheet_name("Q1/Q2")
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .sheet_name("Sales 2024")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_rejects_path_like_filenames() {
        for bad in ["../report.xlsx", "out/report.xlsx", "report.csv", "", "/report.xlsx"] {
            let result = ConversionConfig::builder().output_filename(bad).build();
            assert!(
                matches!(result, Err(Url2XlsxError::InvalidConfig(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(ConversionConfig::builder()
            .output_filename("Report.XLSX")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        assert!(ConversionConfig::builder()
            .download_timeout_secs(0)
            .build()
            .is_err());
        let c = ConversionConfig::builder()
            .download_timeout_secs(30)
            .build()
            .unwrap();
        assert_eq!(c.download_timeout_secs, Some(30));
    }

    #[test]
    fn auto_delimiter_prefers_tab_only_when_strictly_more() {
        assert_eq!(Delimiter::Auto.resolve("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(Delimiter::Auto.resolve("a,b\n1,2"), b',');
        // tie → comma
        assert_eq!(Delimiter::Auto.resolve("a\tb,c"), b',');
        // nothing at all → comma
        assert_eq!(Delimiter::Auto.resolve("single"), b',');
    }

    #[test]
    fn forced_delimiter_ignores_counts() {
        assert_eq!(Delimiter::Comma.resolve("a\tb\tc"), b',');
        assert_eq!(Delimiter::Tab.resolve("a,b,c"), b'\t');
    }
}
