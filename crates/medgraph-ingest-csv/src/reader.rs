//! Source reader: auto-detected encoding → header row → row records.

use crate::columns::{HeaderSynonyms, SemanticField};
use crate::IngestError;
use encoding_rs::{Encoding, GB18030, GBK, UTF_8};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Encodings tried in order. The first one that decodes the whole file
/// cleanly and yields a header carrying the primary field wins.
pub fn candidate_encodings() -> [&'static Encoding; 3] {
    [UTF_8, GBK, GB18030]
}

/// One data row. `fields` maps header → raw cell text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 1-based line in the decoded file.
    pub line: u64,
    pub fields: BTreeMap<String, String>,
}

impl SourceRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SourceTable {
    pub path: PathBuf,
    pub encoding: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
    /// Records the CSV parser rejected; they are dropped.
    pub malformed_rows: usize,
}

pub fn read_source(
    path: &Path,
    primary: SemanticField,
    synonyms: &HeaderSynonyms,
) -> Result<SourceTable, IngestError> {
    let bytes = fs::read(path).map_err(|e| unreadable(path, e.to_string()))?;
    decode_source(path, &bytes, primary, synonyms)
}

/// Same as [`read_source`] over bytes already in memory.
pub fn decode_source(
    path: &Path,
    bytes: &[u8],
    primary: SemanticField,
    synonyms: &HeaderSynonyms,
) -> Result<SourceTable, IngestError> {
    let mut rejected = Vec::new();

    for encoding in candidate_encodings() {
        let Some(text) = decode_strict(bytes, encoding) else {
            rejected.push(format!("{}: malformed byte sequence", encoding.name()));
            continue;
        };

        let headers = match read_headers(&text) {
            Ok(h) => h,
            Err(e) => {
                rejected.push(format!("{}: {e}", encoding.name()));
                continue;
            }
        };

        if synonyms.resolve(primary, &headers).is_none() {
            rejected.push(format!(
                "{}: header has none of {:?}",
                encoding.name(),
                synonyms.headers(primary)
            ));
            continue;
        }

        debug!(path = %path.display(), encoding = encoding.name(), "decoded source");
        return Ok(parse_rows(path, &text, encoding.name(), headers));
    }

    Err(unreadable(path, rejected.join("; ")))
}

fn unreadable(path: &Path, reason: String) -> IngestError {
    IngestError::SourceUnreadable {
        path: path.to_path_buf(),
        reason,
    }
}

/// Whole-file decode that refuses replacement characters.
fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    if encoding == UTF_8 {
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        return std::str::from_utf8(body).ok().map(str::to_owned);
    }
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes())
}

fn read_headers(text: &str) -> Result<Vec<String>, csv::Error> {
    let mut rdr = reader(text);
    Ok(rdr.headers()?.iter().map(clean_header).collect())
}

fn parse_rows(path: &Path, text: &str, encoding: &'static str, headers: Vec<String>) -> SourceTable {
    let mut rows = Vec::new();
    let mut malformed_rows = 0;

    for result in reader(text).records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dropping malformed record");
                malformed_rows += 1;
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(SourceRow { line, fields });
    }

    SourceTable {
        path: path.to_path_buf(),
        encoding,
        headers,
        rows,
        malformed_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], primary: SemanticField) -> Result<SourceTable, IngestError> {
        decode_source(Path::new("test.csv"), bytes, primary, &HeaderSynonyms::default())
    }

    #[test]
    fn reads_utf8_with_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice("疾病名称,典型症状\n感冒,发热、咳嗽\n".as_bytes());

        let table = decode(&bytes, SemanticField::DiseaseName).unwrap();
        assert_eq!(table.encoding, "UTF-8");
        assert_eq!(table.headers, vec!["疾病名称", "典型症状"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("疾病名称"), Some("感冒"));
        assert_eq!(table.rows[0].line, 2);
    }

    #[test]
    fn falls_back_to_gbk() {
        let (bytes, _, had_errors) = GBK.encode("疾病名称,典型症状\n糖尿病,多饮、多尿\n");
        assert!(!had_errors);

        let table = decode(&bytes, SemanticField::DiseaseName).unwrap();
        assert_eq!(table.encoding, "GBK");
        assert_eq!(table.rows[0].get("典型症状"), Some("多饮、多尿"));
    }

    #[test]
    fn rejects_utf16() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "疾病名称,典型症状\n感冒,发热\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }

        match decode(&bytes, SemanticField::DiseaseName) {
            Err(IngestError::SourceUnreadable { reason, .. }) => {
                assert!(reason.contains("UTF-8"));
                assert!(reason.contains("gb18030"));
            }
            other => panic!("expected unreadable, got {other:?}"),
        }
    }

    #[test]
    fn rejects_header_without_primary_field() {
        let err = decode("网址,描述\nhttp://a,b\n".as_bytes(), SemanticField::DiseaseName)
            .unwrap_err();
        assert!(err.to_string().contains("疾病名称"));
    }

    #[test]
    fn tolerates_ragged_rows_and_padded_headers() {
        let text = " Name , Related Symptom 1 ,Related Symptom 2\n感冒,发热\n流感,发热,头痛,extra\n";
        let table = decode(text.as_bytes(), SemanticField::DiseaseName).unwrap();

        assert_eq!(table.headers[0], "Name");
        assert_eq!(table.rows[0].get("Related Symptom 2"), None);
        assert_eq!(table.rows[1].get("Related Symptom 2"), Some("头痛"));
        assert_eq!(table.rows[1].fields.len(), 3);
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = read_source(
            Path::new("/definitely/not/here.csv"),
            SemanticField::DiseaseName,
            &HeaderSynonyms::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::SourceUnreadable { .. }));
    }
}
