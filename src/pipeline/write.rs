//! Write stage: [`RecordSet`] → one-sheet `.xlsx` workbook.
//!
//! `rust_xlsxwriter` builds the whole workbook in memory and zips it on
//! `save`, which is blocking work, so it runs inside `spawn_blocking`.

use crate::error::Url2XlsxError;
use crate::output::SpreadsheetArtifact;
use crate::pipeline::parse::RecordSet;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Worksheet row limit, header included.
pub const MAX_ROWS: usize = 1_048_576;

/// Worksheet column limit.
pub const MAX_COLUMNS: usize = 16_384;

/// Write `records` to `path` as a workbook with a single sheet `sheet_name`.
///
/// Row 1 holds the headers in bold; each record follows in input order with
/// every cell written as a string. An existing file at `path` is replaced.
/// Empty input fails with [`Url2XlsxError::EmptyData`] before anything is
/// created on disk.
pub async fn write(
    records: &RecordSet,
    path: &Path,
    sheet_name: &str,
) -> Result<SpreadsheetArtifact, Url2XlsxError> {
    if records.is_empty() {
        return Err(Url2XlsxError::EmptyData);
    }

    let write_err = |detail: String| Url2XlsxError::WriteFailed {
        path: path.to_path_buf(),
        detail,
    };

    if records.len() >= MAX_ROWS {
        return Err(write_err(format!(
            "{} data rows exceed the worksheet limit of {}",
            records.len(),
            MAX_ROWS - 1
        )));
    }
    if records.headers().len() > MAX_COLUMNS {
        return Err(write_err(format!(
            "{} columns exceed the worksheet limit of {}",
            records.headers().len(),
            MAX_COLUMNS
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_err(format!("cannot create '{}': {e}", parent.display())))?;
    }

    info!("Writing {} rows to {}", records.len(), path.display());

    let owned = records.clone();
    let dest = path.to_path_buf();
    let sheet = sheet_name.to_string();

    tokio::task::spawn_blocking(move || write_blocking(&owned, &dest, &sheet))
        .await
        .map_err(|e| Url2XlsxError::Internal(format!("Write task panicked: {}", e)))?
}

fn write_blocking(
    records: &RecordSet,
    path: &Path,
    sheet_name: &str,
) -> Result<SpreadsheetArtifact, Url2XlsxError> {
    let write_err = |e: XlsxError| Url2XlsxError::WriteFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name).map_err(write_err)?;

    for (col, header) in records.headers().iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &header_format)
            .map_err(write_err)?;
    }

    for (row, record) in records.iter().enumerate() {
        for (col, value) in record.values().iter().enumerate() {
            worksheet
                .write_string(row as u32 + 1, col as u16, value)
                .map_err(write_err)?;
        }
    }

    if let Err(e) = workbook.save(path) {
        let _ = std::fs::remove_file(path);
        return Err(write_err(e));
    }

    debug!("Saved workbook {}", path.display());

    Ok(SpreadsheetArtifact {
        path: PathBuf::from(path),
        sheet_name: sheet_name.to_string(),
        columns: records.headers().to_vec(),
        rows: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Delimiter;
    use crate::pipeline::parse::parse_str;
    use calamine::{open_workbook, Reader, Xlsx};
    use tempfile::TempDir;

    fn read_sheet(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let mut workbook: Xlsx<_> = open_workbook(path).expect("workbook should open");
        let range = workbook
            .worksheet_range(sheet)
            .expect("sheet should exist");
        range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_writes_header_and_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/report.xlsx");
        let records = parse_str("name,age\nA,1\nB,2\nC,3\n", Delimiter::Auto).unwrap();

        let artifact = write(&records, &path, "Data").await.unwrap();

        assert_eq!(artifact.path, path);
        assert_eq!(artifact.sheet_name, "Data");
        assert_eq!(artifact.columns, vec!["name", "age"]);
        assert_eq!(artifact.rows, 3);

        let cells = read_sheet(&path, "Data");
        assert_eq!(
            cells,
            vec![
                vec!["name", "age"],
                vec!["A", "1"],
                vec!["B", "2"],
                vec!["C", "3"],
            ]
        );
    }

    #[tokio::test]
    async fn test_numbers_stay_strings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xlsx");
        let records = parse_str("id,code\n007,1e3\n", Delimiter::Auto).unwrap();

        write(&records, &path, "Data").await.unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range("Data").unwrap();
        assert_eq!(
            range.get_value((1, 0)),
            Some(&calamine::Data::String("007".into()))
        );
        assert_eq!(
            range.get_value((1, 1)),
            Some(&calamine::Data::String("1e3".into()))
        );
    }

    #[tokio::test]
    async fn test_custom_sheet_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xlsx");
        let records = parse_str("a\n1\n", Delimiter::Auto).unwrap();

        write(&records, &path, "Exports").await.unwrap();

        let workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Exports".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_records_fail_without_touching_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never/report.xlsx");
        let records = parse_str("name,age\n", Delimiter::Auto).unwrap();

        let err = write(&records, &path, "Data").await.unwrap_err();

        assert!(matches!(err, Url2XlsxError::EmptyData));
        assert!(!path.exists());
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xlsx");
        std::fs::write(&path, b"stale").unwrap();

        let records = parse_str("k\nv\n", Delimiter::Auto).unwrap();
        write(&records, &path, "Data").await.unwrap();

        assert_eq!(read_sheet(&path, "Data"), vec![vec!["k"], vec!["v"]]);
    }

    #[tokio::test]
    async fn test_invalid_sheet_name_is_write_failed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xlsx");
        let records = parse_str("k\nv\n", Delimiter::Auto).unwrap();

        let err = write(&records, &path, "bad[name]").await.unwrap_err();
        assert_eq!(err.kind(), "write_failed");
        assert!(!path.exists());
    }
}
