//! Parse interval files.
//!
//! An interval file holds one interval per line: the start and end of the interval in seconds,
//! separated by a tab. Blank lines are ignored.

use std::{fs, path::Path};
use thiserror::Error;

/// Extension of interval files.
pub const EXTENSION: &str = "tsv";

/// Errors that can occur when reading an interval file.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid extension: {0}")]
    InvalidExtension(String),
    #[error("line {line}: expected 2 fields, found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },
}

/// Read the intervals of the file at `path`.
pub fn load(path: &Path) -> Result<Vec<(f64, f64)>, Error> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
        return Err(Error::InvalidExtension(path.display().to_string()));
    }
    parse(&fs::read_to_string(path)?)
}

/// Parse the contents of an interval file.
pub fn parse(contents: &str) -> Result<Vec<(f64, f64)>, Error> {
    let mut intervals = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let line_number = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 2 {
            return Err(Error::FieldCount {
                line: line_number,
                found: fields.len(),
            });
        }
        let parse = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidTimestamp {
                    line: line_number,
                    value: value.to_string(),
                })
        };
        intervals.push((parse(fields[0])?, parse(fields[1])?));
    }
    Ok(intervals)
}
