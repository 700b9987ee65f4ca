// VecUpload — record.rs
// Source entity records and the line-delimited JSON reader that produces them.
// Author: d65v <https://github.com/d65v>

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, UploadError};

// ── Record ────────────────────────────────────────────────────────────────────

/// One named/typed code entity, optionally carrying precomputed embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub module: String,
    pub rev: String,
    pub name_hash: u64,
    pub type_hash: u64,
    #[serde(default)]
    pub name_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub type_embedding: Option<Vec<f32>>,
}

impl Record {
    /// Decode a single JSON line. `line` is 1-based and only used for the error.
    pub fn from_json_line(text: &str, line: usize) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| UploadError::Decode { line, source })
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Iterates records from a JSONL source.
///
/// Reading ends at end of input or at the first empty line. Any line that
/// fails to decode yields an error; callers are expected to stop there.
pub struct RecordReader<R> {
    input: R,
    line: usize,
    done: bool,
    buf: String,
}

impl RecordReader<BufReader<File>> {
    /// Open a JSONL file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            done: false,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.input.read_line(&mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line += 1;
                let text = self.buf.trim();
                if text.is_empty() {
                    log::debug!("empty line {} ends input", self.line);
                    self.done = true;
                    return None;
                }
                let record = Record::from_json_line(text, self.line);
                if record.is_err() {
                    self.done = true;
                }
                Some(record)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const FULL: &str = r#"{"name":"foldr","type":"(a -> b -> b) -> b -> [a] -> b","module":"Data.List","rev":"base-4.18","nameHash":12345678901234567890,"typeHash":42,"nameEmbedding":[0.5,-0.25],"typeEmbedding":[1.0,0.0]}"#;
    const BARE: &str = r#"{"name":"id","type":"a -> a","module":"Prelude","rev":"base-4.18","nameHash":7,"typeHash":8}"#;

    #[test]
    fn test_decode_full_record() {
        let rec = Record::from_json_line(FULL, 1).unwrap();
        assert_eq!(
            rec,
            Record {
                name: "foldr".into(),
                ty: "(a -> b -> b) -> b -> [a] -> b".into(),
                module: "Data.List".into(),
                rev: "base-4.18".into(),
                name_hash: 12345678901234567890,
                type_hash: 42,
                name_embedding: Some(vec![0.5, -0.25]),
                type_embedding: Some(vec![1.0, 0.0]),
            }
        );
    }

    #[test]
    fn test_decode_without_embeddings() {
        let rec = Record::from_json_line(BARE, 1).unwrap();
        assert!(rec.name_embedding.is_none());
        assert!(rec.type_embedding.is_none());

        let with_null = BARE.replace("}", r#","nameEmbedding":null}"#);
        let rec = Record::from_json_line(&with_null, 1).unwrap();
        assert!(rec.name_embedding.is_none());
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let err = Record::from_json_line(r#"{"name":"id","type":"a -> a"}"#, 9).unwrap_err();
        assert!(matches!(err, UploadError::Decode { line: 9, .. }));
    }

    #[test]
    fn test_reader_reads_all_lines() {
        let input = format!("{}\n{}\n", FULL, BARE);
        let records: Vec<Record> = RecordReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "id");
    }

    #[test]
    fn test_reader_stops_at_empty_line() {
        let input = format!("{}\n\n{}\n", FULL, BARE);
        let mut reader = RecordReader::new(Cursor::new(input));
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
        assert_eq!(reader.lines_read(), 2);
    }

    #[test]
    fn test_reader_handles_missing_trailing_newline() {
        let records: Vec<Record> = RecordReader::new(Cursor::new(BARE.to_string()))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_reader_reports_bad_line_and_stops() {
        let input = format!("{}\n{}\n{{not json\n{}\n", FULL, BARE, BARE);
        let mut reader = RecordReader::new(Cursor::new(input));
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, UploadError::Decode { line: 3, .. }));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", BARE).unwrap();
        let records: Vec<Record> = RecordReader::open(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records[0].module, "Prelude");
    }
}
