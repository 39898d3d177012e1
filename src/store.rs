// src/store.rs

//! Flat text persistence of accumulator matrices, one file per metric.
//!
//! A file holds one line per cohort with the time-bucket values separated by
//! single spaces.

use crate::error::CohortError;
use crate::model::{Matrix, Snapshot};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `<metric>_<tag>`, shared by data files and charts
pub fn file_stem(metric: &str, tag: &str) -> String {
    format!("{metric}_{tag}")
}

/// `<metric>_<tag>.txt` inside `dir`
pub fn metric_path(dir: &Path, metric: &str, tag: &str) -> PathBuf {
    dir.join(format!("{}.txt", file_stem(metric, tag)))
}

pub fn write_matrix(path: &Path, matrix: &Matrix) -> Result<(), CohortError> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

pub fn read_matrix(path: &Path) -> Result<Matrix, CohortError> {
    let corrupt = |reason: String| CohortError::CorruptMatrix { path: path.to_path_buf(), reason };

    let raw = fs::read_to_string(path)?;
    let mut values = Vec::new();
    let mut rows = 0;
    let mut cols = None;
    for (line_no, line) in raw.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let before = values.len();
        for token in line.split_whitespace() {
            let value: f64 = token
                .parse()
                .map_err(|_| corrupt(format!("line {}: '{token}' is not a number", line_no + 1)))?;
            values.push(value);
        }
        let width = values.len() - before;
        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(corrupt(format!("line {} has {width} values, expected {expected}", line_no + 1)))
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or_else(|| corrupt("file is empty".into()))?;
    Matrix::from_shape_vec((rows, cols), values).map_err(|e| corrupt(e.to_string()))
}

/// Writes every metric of the snapshot, creating `dir` when needed
pub fn save_snapshot(snapshot: &Snapshot, dir: &Path) -> Result<Vec<PathBuf>, CohortError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(snapshot.metrics.len());
    for (metric, matrix) in &snapshot.metrics {
        let path = metric_path(dir, metric, &snapshot.tag);
        write_matrix(&path, matrix)?;
        debug!(path = %path.display(), "Saved matrix");
        written.push(path);
    }
    info!(cohort = %snapshot.tag, files = written.len(), dir = %dir.display(), "Saved snapshot");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::BTreeMap;

    #[test]
    fn matrices_survive_a_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net_Test_bots.txt");
        let matrix = array![[100.0, -40.0, 0.0], [0.0, 10.5, 1e9]];

        write_matrix(&path, &matrix).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "100 -40 0\n0 10.5 1000000000\n");
        assert_eq!(read_matrix(&path).unwrap(), matrix);
    }

    #[test]
    fn ragged_or_garbled_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let ragged = dir.path().join("ragged.txt");
        fs::write(&ragged, "1 2 3\n4 5\n").unwrap();
        assert!(matches!(read_matrix(&ragged), Err(CohortError::CorruptMatrix { .. })));

        let garbled = dir.path().join("garbled.txt");
        fs::write(&garbled, "1 two 3\n").unwrap();
        assert!(matches!(read_matrix(&garbled), Err(CohortError::CorruptMatrix { .. })));

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "\n").unwrap();
        assert!(matches!(read_matrix(&empty), Err(CohortError::CorruptMatrix { .. })));

        assert!(matches!(read_matrix(&dir.path().join("missing.txt")), Err(CohortError::Io(_))));
    }

    #[test]
    fn snapshot_files_are_named_after_metric_and_tag() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let mut metrics = BTreeMap::new();
        metrics.insert("added".to_string(), array![[1.0]]);
        metrics.insert("edits".to_string(), array![[2.0]]);
        let snapshot = Snapshot {
            cohort: "Namespaces".into(),
            tag: "Namespaces_nobots_NS-0-1".into(),
            cohort_labels: vec!["0 namespace".into()],
            time_buckets: vec!["200401".into()],
            metrics,
            descriptions: BTreeMap::new(),
        };

        let written = save_snapshot(&snapshot, &out).unwrap();
        assert_eq!(
            written,
            vec![out.join("added_Namespaces_nobots_NS-0-1.txt"), out.join("edits_Namespaces_nobots_NS-0-1.txt")]
        );
        assert_eq!(read_matrix(&written[1]).unwrap(), array![[2.0]]);
    }
}
