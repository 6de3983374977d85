//! Parse stage: delimited text → [`RecordSet`].
//!
//! The whole file is read into memory; tabular payloads this tool handles
//! are expected to fit. The first row is the header and every later row
//! becomes a [`Record`] keyed by it. Blank lines are skipped. Rows whose
//! field count differs from the header's, and quote characters outside a
//! properly quoted field, are rejected rather than silently padded.

use crate::config::Delimiter;
use crate::error::Url2XlsxError;
use csv::ReaderBuilder;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One data row: an ordered mapping from column name to cell value.
///
/// Records from the same [`RecordSet`] share one header list, so the key set
/// is identical across them by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl Record {
    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .map(|i| self.values[i].as_str())
    }

    /// Column names in source order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(String::as_str)
    }

    /// Cell values in column order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys().zip(self.values.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// The parsed table: shared headers plus rows in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    headers: Arc<[String]>,
    records: Vec<Record>,
    delimiter: u8,
}

impl RecordSet {
    /// Build a comma-delimited record set from in-memory rows.
    ///
    /// Every row must have exactly as many values as there are headers.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, Url2XlsxError> {
        let headers: Arc<[String]> = headers.into();
        let mut records = Vec::with_capacity(rows.len());
        for (i, values) in rows.into_iter().enumerate() {
            if values.len() != headers.len() {
                return Err(Url2XlsxError::Parse {
                    path: PathBuf::from("<memory>"),
                    detail: format!(
                        "row {} has {} fields, header has {}",
                        i + 1,
                        values.len(),
                        headers.len()
                    ),
                });
            }
            records.push(Record {
                headers: Arc::clone(&headers),
                values,
            });
        }
        Ok(Self {
            headers,
            records,
            delimiter: b',',
        })
    }

    /// Column names, in first-seen order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The delimiter byte the text was split on.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// `"tab"` or `"comma"`.
    pub fn delimiter_name(&self) -> &'static str {
        if self.delimiter == b'\t' {
            "tab"
        } else {
            "comma"
        }
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Serialize for RecordSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

/// Read and parse the delimited-text file at `path`.
pub async fn parse(path: &Path, delimiter: Delimiter) -> Result<RecordSet, Url2XlsxError> {
    info!("Parsing file: {}", path.display());
    let parse_err = |detail: String| Url2XlsxError::Parse {
        path: path.to_path_buf(),
        detail,
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| parse_err(format!("cannot read file: {e}")))?;
    let text = String::from_utf8(bytes).map_err(|e| parse_err(format!("not valid UTF-8 text: {e}")))?;

    let records = parse_text(&text, delimiter).map_err(parse_err)?;
    info!("Parsed {} rows", records.len());
    Ok(records)
}

/// Parse delimited text held in memory.
pub fn parse_str(text: &str, delimiter: Delimiter) -> Result<RecordSet, Url2XlsxError> {
    parse_text(text, delimiter).map_err(|detail| Url2XlsxError::Parse {
        path: PathBuf::from("<string>"),
        detail,
    })
}

fn parse_text(text: &str, delimiter: Delimiter) -> Result<RecordSet, String> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);

    let delim = delimiter.resolve(text);
    debug!("Using delimiter {:?}", delim as char);

    check_quotes(text, delim)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers: Arc<[String]> = reader
        .headers()
        .map_err(|e| format!("invalid header row: {e}"))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into();

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result.map_err(|e| format!("invalid row {}: {e}", index + 1))?;
        records.push(Record {
            headers: Arc::clone(&headers),
            values: row.iter().map(str::to_string).collect(),
        });
    }

    Ok(RecordSet {
        headers,
        records,
        delimiter: delim,
    })
}

/// Where the quote scanner is within the current field.
#[derive(Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    /// Just read a `"` inside a quoted field: either a closing quote or the
    /// first half of a `""` escape.
    QuoteSeen,
}

/// Reject quote characters the csv reader would otherwise accept silently.
///
/// A `"` may only open a field, must be closed by a `"` followed by the
/// delimiter, a line end or end of input, and `""` inside quotes is a
/// literal quote.
fn check_quotes(text: &str, delim: u8) -> Result<(), String> {
    let mut state = QuoteState::FieldStart;
    let mut line = 1usize;
    let mut opened_at = 0usize;

    for b in text.bytes() {
        let at_boundary = b == delim || b == b'\n' || b == b'\r';
        state = match state {
            QuoteState::FieldStart | QuoteState::Unquoted if at_boundary => QuoteState::FieldStart,
            QuoteState::FieldStart if b == b'"' => {
                opened_at = line;
                QuoteState::Quoted
            }
            QuoteState::Unquoted if b == b'"' => {
                return Err(format!("quote inside unquoted field on line {line}"));
            }
            QuoteState::FieldStart | QuoteState::Unquoted => QuoteState::Unquoted,
            QuoteState::Quoted if b == b'"' => QuoteState::QuoteSeen,
            QuoteState::Quoted => QuoteState::Quoted,
            QuoteState::QuoteSeen if b == b'"' => QuoteState::Quoted,
            QuoteState::QuoteSeen if at_boundary => QuoteState::FieldStart,
            QuoteState::QuoteSeen => {
                return Err(format!("unexpected character after closing quote on line {line}"));
            }
        };
        if b == b'\n' {
            line += 1;
        }
    }

    if state == QuoteState::Quoted {
        return Err(format!("unterminated quoted field opened on line {opened_at}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rows(set: &RecordSet) -> Vec<Vec<&str>> {
        set.iter()
            .map(|r| r.values().iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_comma_separated() {
        let set = parse_str("name,age\nA,1\nB,2\nC,3", Delimiter::Auto).unwrap();
        assert_eq!(set.headers(), ["name", "age"]);
        assert_eq!(set.delimiter_name(), "comma");
        assert_eq!(rows(&set), vec![vec!["A", "1"], vec!["B", "2"], vec!["C", "3"]]);
        assert_eq!(set.records()[1].get("age"), Some("2"));
        assert_eq!(set.records()[1].get("missing"), None);
    }

    #[test]
    fn test_tab_separated_when_tabs_outnumber_commas() {
        let set = parse_str("city\tnote\nParis\tbig, old\nRome\tsmall\n", Delimiter::Auto).unwrap();
        assert_eq!(set.delimiter(), b'\t');
        assert_eq!(set.headers(), ["city", "note"]);
        assert_eq!(set.records()[0].get("note"), Some("big, old"));
    }

    #[test]
    fn test_tie_falls_back_to_comma() {
        // one tab, one comma
        let set = parse_str("a,b\tc\n", Delimiter::Auto).unwrap();
        assert_eq!(set.delimiter(), b',');
        assert_eq!(set.headers(), ["a", "b\tc"]);
    }

    #[test]
    fn test_forced_delimiter() {
        let set = parse_str("a,b\tc\n1,2\t3\n", Delimiter::Tab).unwrap();
        assert_eq!(set.headers(), ["a,b", "c"]);
        assert_eq!(rows(&set), vec![vec!["1,2", "3"]]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let set = parse_str("name,age\n\nA,1\n\n\nB,2\n\n", Delimiter::Auto).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_crlf_and_bom() {
        let set = parse_str("\u{FEFF}name,age\r\nA,1\r\n", Delimiter::Auto).unwrap();
        assert_eq!(set.headers(), ["name", "age"]);
        assert_eq!(rows(&set), vec![vec!["A", "1"]]);
    }

    #[test]
    fn test_quoted_fields() {
        let set = parse_str(
            "name,quote\nA,\"hello, world\"\nB,\"say \"\"hi\"\"\"\n",
            Delimiter::Auto,
        )
        .unwrap();
        assert_eq!(set.records()[0].get("quote"), Some("hello, world"));
        assert_eq!(set.records()[1].get("quote"), Some("say \"hi\""));
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let err = parse_str("a,b\n1,2\n3,4,5\n", Delimiter::Auto).unwrap_err();
        match err {
            Url2XlsxError::Parse { detail, .. } => assert!(detail.contains("row 2"), "got: {detail}"),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_quote_is_parse_error() {
        let err = parse_str("a,b\n1,\"never closed\n", Delimiter::Auto).unwrap_err();
        assert_eq!(err.kind(), "parse");
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_stray_quote_with_open_field_is_parse_error() {
        // two quotes in total: one inside a bare field, one never closed
        let err = parse_str("a,b\nx\"y,\"open\n", Delimiter::Auto).unwrap_err();
        match err {
            Url2XlsxError::Parse { detail, .. } => {
                assert!(detail.contains("unquoted field on line 2"), "got: {detail}")
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_text_after_closing_quote_is_parse_error() {
        let err = parse_str("a,b\n\"x\"y,1\n", Delimiter::Auto).unwrap_err();
        assert!(err.to_string().contains("after closing quote"), "got: {err}");
    }

    #[test]
    fn test_quoted_field_may_span_lines() {
        let set = parse_str("a,b\n\"line one\nline two\",1\n", Delimiter::Auto).unwrap();
        assert_eq!(set.records()[0].get("a"), Some("line one\nline two"));
    }

    #[test]
    fn test_quotes_checked_against_chosen_delimiter() {
        // comma-quoted field is bare under a forced tab delimiter
        let err = parse_str("a\tb\n\"x\",y\t1\n", Delimiter::Tab).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_header_only_and_empty_yield_empty_set() {
        let set = parse_str("name,age\n", Delimiter::Auto).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.headers(), ["name", "age"]);

        let set = parse_str("", Delimiter::Auto).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_record_serialises_in_column_order() {
        let set = parse_str("zeta,alpha\n1,2\n", Delimiter::Auto).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"zeta":"1","alpha":"2"}]"#);
    }

    #[test]
    fn test_record_set_new_checks_row_width() {
        let ok = RecordSet::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()]],
        )
        .unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok.records()[0].keys().collect::<Vec<_>>(), ["a", "b"]);

        let bad = RecordSet::new(vec!["a".into()], vec![vec!["1".into(), "2".into()]]);
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_parse_file() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("data.tsv");
        std::fs::write(&p, "x\ty\n1\t2\n").unwrap();

        let set = parse(&p, Delimiter::Auto).await.unwrap();
        assert_eq!(set.headers(), ["x", "y"]);
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("binary.csv");
        std::fs::write(&p, [0x66, 0x6F, 0xFF, 0xFE, 0x2C, 0x0A]).unwrap();

        let err = parse(&p, Delimiter::Auto).await.unwrap_err();
        match err {
            Url2XlsxError::Parse { path, detail } => {
                assert_eq!(path, p);
                assert!(detail.contains("UTF-8"), "got: {detail}");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }
}
