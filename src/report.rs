// src/report.rs

//! The standard report: which cohorts are aggregated, where their matrices are
//! stored and which charts are drawn from them.
//!
//! ```text
//! Community_roles
//! Cohort_trends
//!     Absolute_Age / Relative_Age
//!         More_than_1_edit, More_than_5_edits, More_than_100_edits, Less_than_100_edits
//!     New_editors
//!     Histogram_cohorts
//!     Namespaces
//!     Editor_trends
//! ```

use crate::analyzer;
use crate::bots::BotFilter;
use crate::cohort::{CohortEngine, CohortKind, RoleSets};
use crate::config::EngineConfig;
use crate::error::CohortError;
use crate::renderer::{self, ChartOptions};
use crate::store;
use indicatif::{MultiProgress, ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const COMMUNITY: &str = "Community_roles";
pub const COHORT_TRENDS: &str = "Cohort_trends";

/// Activation bounds of the age cohort families, by directory
const AGE_BOUNDS: [(&str, i64, Option<i64>); 4] = [
    ("More_than_1_edit", 1, None),
    ("More_than_5_edits", 5, None),
    ("More_than_100_edits", 100, None),
    ("Less_than_100_edits", 1, Some(100)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chart {
    WikiPride,
    Line,
}

/// One cohort instance of the report
#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// Relative to the data and graph roots
    pub dir: PathBuf,
    pub kind: CohortKind,
    pub config: EngineConfig,
    pub chart: Chart,
    /// Draw the first cohort on top
    pub flip: bool,
    pub metrics: Vec<String>,
}

impl ReportEntry {
    fn new(dir: PathBuf, kind: CohortKind, config: EngineConfig, metrics: &[&str]) -> Self {
        Self { dir, kind, config, chart: Chart::WikiPride, flip: false, metrics: metrics.iter().map(|m| m.to_string()).collect() }
    }
}

/// A lone cohort writing straight into the roots, charting every metric it has
pub fn single_entry(kind: CohortKind, config: EngineConfig) -> ReportEntry {
    let metrics = kind.metrics();
    let chart = if matches!(kind, CohortKind::EditorTrends { .. }) { Chart::Line } else { Chart::WikiPride };
    ReportEntry { dir: PathBuf::new(), kind, config, chart, flip: false, metrics }
}

pub fn standard_report(base: &EngineConfig, roles: Option<Arc<RoleSets>>) -> Vec<ReportEntry> {
    const WIKIPRIDE: [&str; 3] = ["added", "edits", "editors"];
    let trends = Path::new(COHORT_TRENDS);
    let mut entries = Vec::new();

    for (family, kind, flip) in [
        ("Absolute_Age", CohortKind::ActiveAbsoluteAge, false),
        ("Relative_Age", CohortKind::ActiveRelativeAge, true),
    ] {
        for (dir, min, max) in AGE_BOUNDS {
            let config = base.clone().with_activation(min, max);
            let mut entry = ReportEntry::new(trends.join(family).join(dir), kind.clone(), config, &WIKIPRIDE);
            entry.flip = flip;
            entries.push(entry);
        }
    }

    entries.push(ReportEntry::new(trends.join("New_editors"), CohortKind::new_editor_activity(), base.clone(), &WIKIPRIDE));
    entries.push(ReportEntry::new(
        trends.join("Histogram_cohorts"),
        CohortKind::edits_histogram(),
        base.clone(),
        &["editsHistogram"],
    ));
    entries.push(ReportEntry::new(trends.join("Histogram_cohorts"), CohortKind::editor_activity(), base.clone(), &WIKIPRIDE));
    entries.push(ReportEntry::new(trends.join("Namespaces"), CohortKind::Namespaces, base.clone(), &["added", "edits"]));

    let mut editor_trends = ReportEntry::new(trends.join("Editor_trends"), CohortKind::editor_trends(), base.clone(), &WIKIPRIDE);
    editor_trends.chart = Chart::Line;
    entries.push(editor_trends);

    match roles {
        Some(roles) => entries.push(ReportEntry::new(
            PathBuf::from(COMMUNITY),
            CohortKind::EditorRoles { roles },
            base.clone(),
            &["reverts", "reverters"],
        )),
        None => info!("No role lists configured, skipping the community roles"),
    }
    entries
}

fn collect_all<T>(results: Vec<Result<T, CohortError>>) -> Result<Vec<T>, CohortError> {
    results.into_iter().collect()
}

/// Aggregates every entry in parallel, one engine and one row reader each,
/// and saves their matrices under `data_root`
pub fn run_data_step(
    entries: &[ReportEntry],
    bots: Arc<BotFilter>,
    rows: Option<&Path>,
    data_root: &Path,
) -> Result<Vec<PathBuf>, CohortError> {
    info!(cohorts = entries.len(), root = %data_root.display(), "Aggregating the cohort data");
    let multi = MultiProgress::new();

    let results: Vec<Result<Vec<PathBuf>, CohortError>> = entries
        .par_iter()
        .map(|entry| {
            let bar = multi.add(analyzer::spinner());
            let engine = analyzer::aggregate(entry.kind.clone(), entry.config.clone(), Arc::clone(&bots), rows, bar)?;
            store::save_snapshot(&engine.snapshot()?, &data_root.join(&entry.dir))
        })
        .collect();

    Ok(collect_all(results)?.into_iter().flatten().collect())
}

/// Loads the saved matrices of every entry and draws their charts under
/// `graph_root`. Returns the number of charts drawn; charts that cannot be
/// drawn in this build are skipped.
pub fn run_report_step(
    entries: &[ReportEntry],
    bots: Arc<BotFilter>,
    data_root: &Path,
    graph_root: &Path,
    options: &ChartOptions,
) -> Result<usize, CohortError> {
    info!(cohorts = entries.len(), root = %graph_root.display(), "Producing the report graphs");
    let bar = ProgressBar::new(entries.len() as u64);
    bar.set_message("Rendering charts");

    let results: Vec<Result<usize, CohortError>> = entries
        .par_iter()
        .progress_with(bar)
        .map(|entry| draw_entry(entry, Arc::clone(&bots), data_root, graph_root, options))
        .collect();

    Ok(collect_all(results)?.into_iter().sum())
}

fn draw_entry(
    entry: &ReportEntry,
    bots: Arc<BotFilter>,
    data_root: &Path,
    graph_root: &Path,
    options: &ChartOptions,
) -> Result<usize, CohortError> {
    let mut engine = CohortEngine::new(entry.kind.clone(), entry.config.clone(), bots)?;
    let data_dir = data_root.join(&entry.dir);
    let graph_dir = graph_root.join(&entry.dir);
    let options = options.flipped(entry.flip);

    let mut drawn = 0;
    for metric in &entry.metrics {
        engine.load_from_disk(&data_dir, metric)?;
        let result = match entry.chart {
            Chart::WikiPride => renderer::wiki_pride(&engine, metric, &options, &graph_dir),
            Chart::Line => renderer::line_plot(&engine, metric, &options, &graph_dir),
        };
        match result {
            Ok(_) => drawn += 1,
            Err(CohortError::MissingDependency { feature, reason }) => {
                warn!(feature, %reason, "Skipping chart");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn standard_report_layout() {
        let base = EngineConfig::new("200401", "200412");
        let entries = standard_report(&base, None);
        assert_eq!(entries.len(), 13);

        let less = &entries[3];
        assert_eq!(less.dir, Path::new("Cohort_trends/Absolute_Age/Less_than_100_edits"));
        assert_eq!((less.config.activation_min, less.config.activation_max), (1, Some(100)));
        assert!(!less.flip);
        assert!(entries[4].flip);
        assert!(entries.iter().all(|e| !e.dir.starts_with(COMMUNITY)));
        assert_eq!(entries.iter().filter(|e| e.chart == Chart::Line).count(), 1);

        let with_roles = standard_report(&base, Some(Arc::new(RoleSets::default())));
        assert_eq!(with_roles.len(), 14);
        assert_eq!(with_roles[13].dir, Path::new(COMMUNITY));
    }

    #[test]
    fn single_entries_chart_every_metric() {
        let entry = single_entry(CohortKind::Namespaces, EngineConfig::new("200401", "200402"));
        assert_eq!(entry.metrics, vec!["added", "removed", "net", "edits"]);
        assert_eq!(entry.dir, PathBuf::new());
        assert_eq!(single_entry(CohortKind::editor_trends(), entry.config).chart, Chart::Line);
    }

    #[test]
    fn data_then_report() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("rows.jsonl");
        let line = |id: u64, month: u32, first: u32, edits: i64| {
            format!(
                r#"{{"user_id": {id}, "rev_year": 2004, "rev_month": {month}, "namespace": 0, "first_edit_year": 2004, "first_edit_month": {first}, "len_added": 10, "add_edits": {edits}, "total_edits": {edits}}}"#
            )
        };
        fs::write(&rows, [line(1, 1, 1, 3), line(1, 2, 1, 120), line(2, 2, 2, 7)].join("\n")).unwrap();

        let base = EngineConfig::new("200401", "200403");
        let entries: Vec<ReportEntry> = standard_report(&base, None)
            .into_iter()
            .filter(|e| e.dir.ends_with("More_than_5_edits") || e.dir.ends_with("Namespaces"))
            .collect();
        assert_eq!(entries.len(), 3);

        let data_root = dir.path().join("data");
        let bots = Arc::new(BotFilter::disabled());
        let files = run_data_step(&entries, Arc::clone(&bots), Some(rows.as_path()), &data_root).unwrap();
        let editors = data_root.join("Cohort_trends/Absolute_Age/More_than_5_edits/editors_AbsoluteAgeAllNamespaces_bots.txt");
        assert!(files.contains(&editors));
        assert_eq!(store::read_matrix(&editors).unwrap().sum(), 2.0);

        let graph_root = dir.path().join("graphs");
        let options = ChartOptions { width: 160, height: 90, normal: true, percentage: true, flip: false, ncolors: None };
        let drawn = run_report_step(&entries, bots, &data_root, &graph_root, &options).unwrap();
        if cfg!(feature = "render") {
            assert_eq!(drawn, 8);
            assert!(graph_root.join("Cohort_trends/Namespaces/added_Namespaces_bots.png").exists());
        } else {
            assert_eq!(drawn, 0);
        }
    }

    #[test]
    fn report_step_needs_saved_data() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![single_entry(CohortKind::Namespaces, EngineConfig::new("200401", "200402"))];
        let options = ChartOptions { width: 80, height: 60, normal: true, percentage: false, flip: false, ncolors: None };
        let result = run_report_step(&entries, Arc::new(BotFilter::disabled()), dir.path(), dir.path(), &options);
        assert!(matches!(result, Err(CohortError::Io(_))));
    }
}
