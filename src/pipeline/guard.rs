//! Path confinement for user-influenced file names.
//!
//! URL path segments and archive entry names are attacker-controlled. Before
//! anything is written, the joined path is made absolute and normalised
//! lexically (`.` dropped, `..` popped) and must still lie strictly inside
//! the base directory. Symlinks are not followed: the check is about where
//! the name points, not about what is on disk.

use crate::error::Url2XlsxError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

/// Resolve `target` against `base`, failing if the result escapes `base`.
///
/// Returns the absolute, normalised path. `target` may be relative (the
/// normal case) or absolute; an absolute target replaces `base` when joined
/// and is therefore rejected unless it already points inside `base`.
pub fn resolve(base: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<PathBuf, Url2XlsxError> {
    let base = base.as_ref();
    let target = target.as_ref();

    let abs_base = normalize(&absolutize(base)?);
    let resolved = normalize(&abs_base.join(target));

    if resolved == abs_base || !resolved.starts_with(&abs_base) {
        return Err(Url2XlsxError::UnsafePath {
            base: base.to_path_buf(),
            target: target.to_path_buf(),
        });
    }

    Ok(resolved)
}

/// Turn a URL-derived segment into a single safe file-name component.
///
/// Runs of characters outside `[A-Za-z0-9._-]` collapse to `_` and leading
/// dots are dropped so the result is never hidden, `.` or `..`. Falls back
/// to `download` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = UNSAFE_FILENAME_CHARS.replace_all(name, "_");
    let trimmed = replaced.trim_start_matches('.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, Url2XlsxError> {
    std::path::absolute(path)
        .map_err(|e| Url2XlsxError::Internal(format!("cannot absolutize '{}': {e}", path.display())))
}

/// Lexical normalisation: drop `.`, pop on `..`, never touch the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
        }
    }
    result
}
