//! Extract stage: turn a staged download into a plain-text tabular file.
//!
//! Decision order:
//!
//! 1. **Gzip suffix** (`.gz`, `.gzip`): decompress only when the content
//!    really starts with the gzip magic number `1F 8B`. Servers and users
//!    regularly label plain CSV as `.gz`; those files pass through untouched.
//! 2. **Zip-family suffix** (`.zip`, `.7z`): every entry name is checked by
//!    [`guard::resolve`] *before* the first byte is written, so a single
//!    traversal entry aborts the whole archive and nothing lands on disk.
//!    The first file entry is the table; the rest are reported in
//!    [`ExtractedFile::entries`].
//! 3. **Anything else** is already text.
//!
//! Decompression is streamed with `std::io::copy` on the blocking pool;
//! archives are read through their central directory, never slurped.

use crate::error::Url2XlsxError;
use crate::pipeline::fetch::StagedFile;
use crate::pipeline::guard;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const GZIP_EXTENSIONS: &[&str] = &["gz", "gzip"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z"];

/// How the extracted text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractKind {
    /// The staged file was used as is.
    #[default]
    Passthrough,
    /// The staged file was gunzipped.
    Gzip,
    /// The staged file was an archive; `path` is its first file entry.
    Archive,
}

/// Output of the extract stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// The delimited-text file handed to the parser.
    pub path: PathBuf,
    pub kind: ExtractKind,
    /// Every file written from an archive, in archive order. Empty unless
    /// `kind` is [`ExtractKind::Archive`].
    pub entries: Vec<PathBuf>,
}

impl ExtractedFile {
    fn unchanged(path: PathBuf) -> Self {
        Self {
            path,
            kind: ExtractKind::Passthrough,
            entries: Vec::new(),
        }
    }
}

/// Extract a file already on disk, reading its signature first.
pub async fn extract(path: &Path) -> Result<ExtractedFile, Url2XlsxError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let staged = StagedFile::inspect(&path).map_err(|e| Url2XlsxError::Extraction {
            path: path.clone(),
            detail: format!("cannot read file: {e}"),
        })?;
        extract_blocking(&staged)
    })
    .await
    .map_err(|e| Url2XlsxError::Internal(format!("Extract task panicked: {}", e)))?
}

/// Extract a file produced by the fetch stage, reusing its recorded signature.
pub async fn extract_staged(staged: &StagedFile) -> Result<ExtractedFile, Url2XlsxError> {
    let staged = staged.clone();
    tokio::task::spawn_blocking(move || extract_blocking(&staged))
        .await
        .map_err(|e| Url2XlsxError::Internal(format!("Extract task panicked: {}", e)))?
}

/// True if the file name ends in a gzip suffix (case-insensitive).
pub fn is_gzip_name(path: &Path) -> bool {
    has_extension(path, GZIP_EXTENSIONS)
}

/// True if the file name ends in a zip-family suffix (case-insensitive).
pub fn is_archive_name(path: &Path) -> bool {
    has_extension(path, ARCHIVE_EXTENSIONS)
}

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| candidates.iter().any(|c| ext.eq_ignore_ascii_case(c)))
}

fn extract_blocking(staged: &StagedFile) -> Result<ExtractedFile, Url2XlsxError> {
    let path = &staged.path;
    info!("Extracting file: {}", path.display());

    if is_gzip_name(path) {
        if !staged.has_gzip_magic() {
            warn!(
                "File {} has a gzip extension but is plain text; skipping gunzip",
                path.display()
            );
            return Ok(ExtractedFile::unchanged(path.clone()));
        }
        let out = path.with_extension("");
        gunzip(path, &out)?;
        info!("Decompressed to {}", out.display());
        return Ok(ExtractedFile {
            path: out,
            kind: ExtractKind::Gzip,
            entries: Vec::new(),
        });
    }

    if is_archive_name(path) {
        let entries = unzip(path)?;
        let first = entries[0].clone();
        info!(
            "Extracted {} file(s) from archive; using {}",
            entries.len(),
            first.display()
        );
        return Ok(ExtractedFile {
            path: first,
            kind: ExtractKind::Archive,
            entries,
        });
    }

    debug!("No extraction needed for {}", path.display());
    Ok(ExtractedFile::unchanged(path.clone()))
}

/// Stream-decompress `src` into `dst`. A half-written `dst` is removed on error.
fn gunzip(src: &Path, dst: &Path) -> Result<(), Url2XlsxError> {
    let extraction_err = |detail: String| Url2XlsxError::Extraction {
        path: src.to_path_buf(),
        detail,
    };

    let input = File::open(src).map_err(|e| extraction_err(format!("cannot open: {e}")))?;
    let output = File::create(dst)
        .map_err(|e| extraction_err(format!("cannot create '{}': {e}", dst.display())))?;

    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);

    let result = io::copy(&mut decoder, &mut writer).and_then(|n| writer.flush().map(|_| n));
    match result {
        Ok(n) => {
            debug!("Gunzipped {} -> {} bytes", src.display(), n);
            Ok(())
        }
        Err(e) => {
            drop(writer);
            let _ = std::fs::remove_file(dst);
            Err(extraction_err(format!("gzip stream is corrupt: {e}")))
        }
    }
}

/// Unpack every entry of a zip archive next to it.
///
/// Returns the written file paths in archive order; never empty.
fn unzip(archive_path: &Path) -> Result<Vec<PathBuf>, Url2XlsxError> {
    let extraction_err = |detail: String| Url2XlsxError::Extraction {
        path: archive_path.to_path_buf(),
        detail,
    };

    let base = archive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let file = File::open(archive_path).map_err(|e| extraction_err(format!("cannot open: {e}")))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| extraction_err(format!("not a readable zip archive: {e}")))?;

    let own_path = archive_path
        .file_name()
        .map(|name| guard::resolve(base, name))
        .transpose()?;

    // Pass 1: resolve every entry name before writing anything.
    let mut plan: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| extraction_err(format!("entry {index}: {e}")))?;
        let target = guard::resolve(base, entry.name())?;
        if own_path.as_ref() == Some(&target) {
            return Err(extraction_err(format!(
                "entry '{}' would overwrite the archive itself",
                entry.name()
            )));
        }
        plan.push((index, target, entry.is_dir()));
    }

    if plan.iter().all(|(_, _, is_dir)| *is_dir) {
        return Err(extraction_err("No files extracted from archive".to_string()));
    }

    // Pass 2: write.
    let mut written = Vec::new();
    for (index, target, is_dir) in plan {
        if is_dir {
            std::fs::create_dir_all(&target)
                .map_err(|e| extraction_err(format!("cannot create '{}': {e}", target.display())))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| extraction_err(format!("cannot create '{}': {e}", parent.display())))?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| extraction_err(format!("entry {index}: {e}")))?;
        let out = File::create(&target)
            .map_err(|e| extraction_err(format!("cannot create '{}': {e}", target.display())))?;
        let mut writer = BufWriter::new(out);
        io::copy(&mut entry, &mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| extraction_err(format!("entry '{}': {e}", target.display())))?;

        debug!("Extracted {}", target.display());
        written.push(target);
    }

    Ok(written)
}
