//! Header-first delimited feed reader

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedload_core::{FeedloadError, Result, Value};

use crate::coercion::coerce_field;

/// One parsed data record: header column names paired with coerced values
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    headers: Arc<[String]>,
    values: Vec<Value>,
    line: u64,
}

impl FeedRow {
    pub fn new(headers: Arc<[String]>, values: Vec<Value>, line: u64) -> Self {
        Self {
            headers,
            values,
            line,
        }
    }

    /// Value of the column named `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Values in header order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Line of the record in the source file (1-based)
    pub fn line(&self) -> u64 {
        self.line
    }

    /// (column, value) pairs in header order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Streams the records of one feed file.
///
/// The first record is the header. Records are read lazily, one per iteration
/// step, and each field is coerced as it is read. A record whose field count
/// differs from the header is a parse error.
pub struct FeedReader {
    path: PathBuf,
    headers: Arc<[String]>,
    records: csv::StringRecordsIntoIter<File>,
}

impl FeedReader {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_path(path)
            .map_err(|e| parse_error(path, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| parse_error(path, e))?
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if idx == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();

        tracing::debug!(path = %path.display(), columns = headers.len(), "opened feed file");

        Ok(Self {
            path: path.to_path_buf(),
            headers: headers.into(),
            records: reader.into_records(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for FeedReader {
    type Item = Result<FeedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(match record {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let values = record.iter().map(coerce_field).collect();
                Ok(FeedRow::new(Arc::clone(&self.headers), values, line))
            }
            Err(e) => Err(parse_error(&self.path, e)),
        })
    }
}

fn parse_error(path: &Path, error: csv::Error) -> FeedloadError {
    let line = error.position().map(|p| p.line()).unwrap_or_default();
    let message = error.to_string();
    match error.into_kind() {
        csv::ErrorKind::Io(io) => FeedloadError::Io(io),
        _ => FeedloadError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        },
    }
}
