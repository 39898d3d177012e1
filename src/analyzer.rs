// src/analyzer.rs

use crate::bots::BotFilter;
use crate::cohort::{CohortEngine, CohortKind};
use crate::config::EngineConfig;
use crate::error::CohortError;
use crate::source::JsonLinesSource;
use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Row counter for a pass of unknown length
pub fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}: {human_pos} rows ({per_sec})") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Builds an engine for `kind`, runs one pass over the rows at `rows` and
/// finalizes it. Every call opens its own reader, so calls may run in parallel.
pub fn aggregate(
    kind: CohortKind,
    config: EngineConfig,
    bots: Arc<BotFilter>,
    rows: Option<&Path>,
    bar: ProgressBar,
) -> Result<CohortEngine, CohortError> {
    let source = JsonLinesSource::open(rows)?;
    let mut engine = CohortEngine::new(kind, config, bots)?;
    info!(cohort = %engine.tag(), path = %source.path().display(), "Analyzing rows");
    let start = Instant::now();

    engine.init_data();
    bar.set_message(engine.tag());
    let count = engine.run_pass(source.progress_with(bar.clone()))?;
    bar.finish_with_message(format!("{} complete", engine.tag()));

    engine.finalize()?;
    info!(cohort = %engine.tag(), rows = count, elapsed = ?start.elapsed(), "Aggregation finished");
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use std::fs;

    #[test]
    fn aggregates_a_row_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"user_id": 1, "rev_year": 2004, "rev_month": 1, "namespace": 0, "first_edit_year": 2004, "first_edit_month": 1, "len_added": 100, "add_edits": 1}"#,
                "\n",
                r#"{"user_id": 1, "rev_year": 2004, "rev_month": 2, "namespace": 0, "first_edit_year": 2004, "first_edit_month": 1, "len_removed": -40, "remove_edits": 1}"#,
                "\n\n",
                r#"{"user_id": 2, "rev_year": 2004, "rev_month": 2, "namespace": "0", "first_edit_year": 2004, "first_edit_month": 2, "len_added": 10, "add_edits": 1}"#,
                "\n",
            ),
        )
        .unwrap();

        let engine = aggregate(
            CohortKind::AbsoluteAge,
            EngineConfig::new("200401", "200402"),
            Arc::new(BotFilter::disabled()),
            Some(path.as_path()),
            ProgressBar::hidden(),
        )
        .unwrap();

        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.metric("net").unwrap()[(0, 1)], -40.0);
        assert_eq!(snapshot.metric("editors").unwrap().sum(), 3.0);
        assert!(snapshot.metric("addedPerEdit").is_some());
    }

    #[test]
    fn missing_and_unconfigured_sources_differ() {
        let run = |rows: Option<&Path>| {
            aggregate(
                CohortKind::AbsoluteAge,
                EngineConfig::new("200401", "200402"),
                Arc::new(BotFilter::disabled()),
                rows,
                ProgressBar::hidden(),
            )
        };

        assert!(matches!(
            run(None),
            Err(CohortError::SourceUnavailable(SourceError::NotConfigured { .. }))
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            run(Some(dir.path().join("absent.jsonl").as_path())),
            Err(CohortError::SourceUnavailable(SourceError::Unreachable { .. }))
        ));
    }

    #[test]
    fn a_bad_line_aborts_strict_cohorts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(&path, "{\"user_id\": 1,\n").unwrap();

        let result = aggregate(
            CohortKind::AbsoluteAge,
            EngineConfig::new("200401", "200402"),
            Arc::new(BotFilter::disabled()),
            Some(path.as_path()),
            ProgressBar::hidden(),
        );
        assert!(matches!(result, Err(CohortError::RowProcessing { .. })));
    }
}
