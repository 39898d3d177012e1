// src/source.rs

use crate::error::{CohortError, SourceError};
use crate::model::{ContributorId, Row};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Streams rows from a file holding one JSON object per line.
///
/// Rows are yielded in file order; the windowed cohorts expect the file to be
/// sorted by contributor, then by time.
pub struct JsonLinesSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonLinesSource {
    pub fn open(path: Option<&Path>) -> Result<Self, CohortError> {
        let path = path.ok_or(SourceError::NotConfigured { what: "row source" })?;
        let file = File::open(path).map_err(|source| SourceError::Unreachable {
            what: "row source",
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self { path: path.to_path_buf(), lines: BufReader::new(file).lines(), line_no: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for JsonLinesSource {
    type Item = Result<Row, CohortError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            match line {
                Err(e) => return Some(Err(CohortError::Io(e))),
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => {
                    let line_no = self.line_no;
                    return Some(serde_json::from_str(&text).map_err(|e| CohortError::RowProcessing {
                        reason: format!("line {line_no}: {e}"),
                        row: text,
                    }));
                }
            }
        }
    }
}

/// Reads a flat file of contributor ids, one per line
pub fn read_id_list(path: &Path, what: &'static str) -> Result<Vec<ContributorId>, CohortError> {
    let raw = fs::read_to_string(path).map_err(|source| SourceError::Unreachable {
        what,
        path: path.to_path_buf(),
        source,
    })?;

    raw.lines()
        .enumerate()
        .map(|(i, line)| (i, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            line.parse().map_err(|_| CohortError::RowProcessing {
                row: line.to_string(),
                reason: format!("{what} line {} is not a contributor id", i + 1),
            })
        })
        .collect()
}
