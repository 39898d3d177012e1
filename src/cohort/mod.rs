// src/cohort/mod.rs

//! The cohort engine.
//!
//! One engine owns the accumulator matrices of a single cohort strategy. It is
//! zeroed by [`CohortEngine::init_data`], fed by one streaming pass over rows,
//! optionally finalized, and then read through [`CohortEngine::snapshot`].
//!
//! Rows must arrive grouped by contributor and then ordered by time. The
//! engine relies on this for editor de-duplication and for the new editor
//! window but does not check it.

pub mod index;
pub mod kind;
mod window;

pub use index::CohortIndex;
pub use kind::{AgeMode, CohortKind, RevertAction, RoleSets, RowPolicy, TickStyle};

use crate::bots::BotFilter;
use crate::config::EngineConfig;
use crate::error::CohortError;
use crate::model::{
    CohortDefinition, ContributorId, EditCount, Matrix, MetricDescription, MissingField, Row, Snapshot,
};
use crate::store;
use crate::time_index::{add_months, TimeIndex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use window::NewEditorWindow;

const PROGRESS_EVERY: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    /// Matrices zeroed, no row seen yet
    Initialized,
    Accumulating,
    /// A pass completed or a matrix was loaded. Ready to read, rows are
    /// rejected until the next `init_data`
    Finalized,
}

/// Accumulator matrices plus the scan state carried from one row to the next
#[derive(Debug, Default)]
struct Accumulators {
    cells: BTreeMap<String, Matrix>,
    /// Last (contributor, time bucket) counted as an active editor
    last_editor: Option<(ContributorId, usize)>,
    window: Option<NewEditorWindow>,
}

impl Accumulators {
    /// Cells outside the matrix and unknown metrics are ignored
    fn add(&mut self, metric: &str, cohort: usize, time: usize, value: f64) {
        if let Some(cell) = self.cells.get_mut(metric).and_then(|m| m.get_mut((cohort, time))) {
            *cell += value;
        }
    }

    fn add_bytes(&mut self, cohort: usize, time: usize, added: i64, removed: i64) {
        self.add("added", cohort, time, added as f64);
        self.add("removed", cohort, time, removed as f64);
        self.add("net", cohort, time, (added + removed) as f64);
    }

    /// Counts a contributor once per run of rows sharing a time bucket
    fn count_editor(&mut self, id: ContributorId, cohort: usize, time: usize) {
        if self.last_editor != Some((id, time)) {
            self.add("editors", cohort, time, 1.0);
            self.last_editor = Some((id, time));
        }
    }
}

#[derive(Debug)]
pub struct CohortEngine {
    kind: CohortKind,
    config: EngineConfig,
    bots: Arc<BotFilter>,
    time: TimeIndex,
    definition: CohortDefinition,
    state: EngineState,
    /// A pass completed or a matrix was loaded
    aggregated: bool,
    acc: Accumulators,
    descriptions: BTreeMap<String, MetricDescription>,
}

impl CohortEngine {
    pub fn new(kind: CohortKind, config: EngineConfig, bots: Arc<BotFilter>) -> Result<Self, CohortError> {
        kind.validate()?;
        let time = kind.time_index(&config)?;
        if time.is_empty() {
            return Err(CohortError::Configuration(format!(
                "time range {} to {} is empty",
                config.time_range_start, config.time_range_end
            )));
        }
        let definition = kind.definition(&time)?;
        let mut engine = Self {
            kind,
            config,
            bots,
            time,
            definition,
            state: EngineState::Uninitialized,
            aggregated: false,
            acc: Accumulators::default(),
            descriptions: BTreeMap::new(),
        };
        engine.describe();
        Ok(engine)
    }

    pub fn kind(&self) -> &CohortKind {
        &self.kind
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn time_index(&self) -> &TimeIndex {
        &self.time
    }

    pub fn definition(&self) -> &CohortDefinition {
        &self.definition
    }

    pub fn descriptions(&self) -> &BTreeMap<String, MetricDescription> {
        &self.descriptions
    }

    pub fn metric(&self, name: &str) -> Option<&Matrix> {
        self.acc.cells.get(name)
    }

    fn filters_bots(&self) -> bool {
        self.config.filter_bots && self.bots.is_enabled()
    }

    fn is_bot(&self, id: ContributorId) -> bool {
        self.config.filter_bots && self.bots.is_bot(id)
    }

    /// Identifies this instance in file names: cohort, bot filter and
    /// namespace filter. Activation bounds are kept apart by directory.
    pub fn tag(&self) -> String {
        let mut parts = vec![self.kind.name()];
        parts.push(if self.filters_bots() { "nobots" } else { "bots" }.to_string());
        let namespaces = self.config.namespace_label();
        if namespaces != "all" {
            parts.push(format!("NS-{}", namespaces.replace(',', "-")));
        }
        parts.join("_")
    }

    fn describe(&mut self) {
        self.descriptions = self.kind.descriptions(&self.config, self.filters_bots());
        if self.acc.cells.contains_key("addedPerEdit") || self.acc.cells.contains_key("editsPerEditor") {
            kind::derived_descriptions(&mut self.descriptions, &self.kind.name());
        }
    }

    /// Replaces every accumulator with a zero matrix and rebuilds the metric descriptions
    pub fn init_data(&mut self) {
        let shape = (self.definition.len(), self.time.len());
        self.acc = Accumulators {
            cells: self.kind.metrics().into_iter().map(|m| (m, Matrix::zeros(shape))).collect(),
            ..Accumulators::default()
        };
        self.describe();
        self.state = EngineState::Initialized;
        self.aggregated = false;
        debug!(cohort = %self.kind.name(), cohorts = shape.0, buckets = shape.1, "Initialized accumulators");
    }

    /// Cohorts a row belongs to at time bucket `time`
    pub fn index(&self, row: &Row, time: usize) -> Result<CohortIndex, MissingField> {
        let cohorts = self.definition.len();
        Ok(match &self.kind {
            CohortKind::AbsoluteAge
            | CohortKind::ActiveAbsoluteAge
            | CohortKind::NewEditorActivity { .. }
            | CohortKind::Reverts { age: AgeMode::Absolute, .. } => self.first_edit(row)?.map(index::absolute_age).into(),
            CohortKind::RelativeAge
            | CohortKind::ActiveRelativeAge
            | CohortKind::Reverts { age: AgeMode::Relative, .. } => self
                .first_edit(row)?
                .and_then(|first| index::relative_age(time, first, cohorts))
                .into(),
            CohortKind::RelativeAgeDays { cycle, .. } => self
                .time
                .get(&row.first_edit_day_key()?)
                .and_then(|first| index::day_of_cycle(time, first, *cycle, cohorts))
                .into(),
            CohortKind::EditsHistogram { thresholds } | CohortKind::EditorActivity { thresholds } => {
                CohortIndex::One(index::histogram(row.edits(EditCount::All), thresholds))
            }
            CohortKind::EditorTrends { levels } => {
                CohortIndex::Many(index::activity_levels(row.edits(EditCount::All), levels).collect())
            }
            CohortKind::Namespaces => {
                let ns = row.namespace.as_deref().ok_or(MissingField("namespace"))?;
                CohortIndex::One(index::namespace(ns))
            }
            CohortKind::EditorRoles { roles } => CohortIndex::One(roles.role_of(row.contributor()?).index()),
            CohortKind::OneYear { year } => match self.first_edit(row)? {
                Some(_) if first_edit_year(row)? == *year => CohortIndex::One(0),
                Some(_) => CohortIndex::One(1),
                None => CohortIndex::Outside,
            },
            CohortKind::ProjectSpace { years } => {
                let first = first_edit_year(row)?;
                years.iter().position(|&y| y == first).into()
            }
        })
    }

    fn first_edit(&self, row: &Row) -> Result<Option<usize>, MissingField> {
        Ok(self.time.get(&row.first_edit_month_key()?))
    }

    /// Feeds one row. Rows outside the time range, from bots, or without a
    /// matching cohort are dropped silently.
    pub fn process_row(&mut self, row: &Row) -> Result<(), CohortError> {
        match self.state {
            EngineState::Initialized | EngineState::Accumulating => {}
            EngineState::Uninitialized | EngineState::Finalized => return Err(CohortError::NotInitialized),
        }
        self.state = EngineState::Accumulating;

        match self.accumulate(row) {
            Ok(()) => Ok(()),
            Err(missing) => self.reject(row.dump(), missing.to_string()),
        }
    }

    fn reject(&self, row: String, reason: String) -> Result<(), CohortError> {
        match self.kind.row_policy() {
            RowPolicy::Strict => {
                error!(cohort = %self.kind.name(), %reason, %row, "Failed to process row");
                Err(CohortError::RowProcessing { row, reason })
            }
            RowPolicy::Skip => {
                warn!(cohort = %self.kind.name(), %reason, %row, "Skipping row");
                Ok(())
            }
        }
    }

    fn accumulate(&mut self, row: &Row) -> Result<(), MissingField> {
        let id = row.contributor()?;
        if let CohortKind::NewEditorActivity { period, .. } = self.kind {
            return self.accumulate_window(id, period, row);
        }

        let key = match self.kind {
            CohortKind::RelativeAgeDays { .. } => row.day_key()?,
            _ => row.month_key()?,
        };
        let Some(time) = self.time.get(&key) else { return Ok(()) };

        // bots are a cohort of their own there
        if !matches!(self.kind, CohortKind::EditorRoles { .. }) && self.is_bot(id) {
            return Ok(());
        }
        let counted = match self.kind {
            CohortKind::Namespaces => true,
            CohortKind::ProjectSpace { .. } => row.namespace.as_deref().is_some_and(index::is_project_namespace),
            _ => self.config.counts_namespace(row.namespace.as_deref()),
        };
        if !counted {
            return Ok(());
        }
        if self.kind.uses_activation() {
            let activity = match self.kind {
                CohortKind::Reverts { .. } => row.reverts.ok_or(MissingField("reverts"))?,
                // edits per month and namespace
                CohortKind::OneYear { .. } | CohortKind::ProjectSpace { .. } => row.add_edits.unwrap_or(0),
                _ => row.edits(EditCount::All),
            };
            if !self.config.qualifies(activity) {
                return Ok(());
            }
        }
        if matches!(self.kind, CohortKind::EditsHistogram { .. }) && row.edits(EditCount::All) <= 0 {
            return Ok(());
        }

        let cohorts = self.index(row, time)?;
        for &cohort in cohorts.cohorts() {
            self.update(cohort, time, id, row);
        }
        Ok(())
    }

    fn update(&mut self, cohort: usize, time: usize, id: ContributorId, row: &Row) {
        let acc = &mut self.acc;
        match &self.kind {
            CohortKind::AbsoluteAge | CohortKind::RelativeAge => {
                acc.add_bytes(cohort, time, row.added(), row.removed());
                acc.add("edits", cohort, time, row.edits(EditCount::AddRemove) as f64);
                acc.count_editor(id, cohort, time);
            }
            CohortKind::RelativeAgeDays { .. }
            | CohortKind::Namespaces
            | CohortKind::OneYear { .. }
            | CohortKind::ProjectSpace { .. } => {
                acc.add_bytes(cohort, time, row.added(), row.removed());
                acc.add("edits", cohort, time, row.edits(EditCount::AddRemove) as f64);
            }
            CohortKind::ActiveAbsoluteAge
            | CohortKind::ActiveRelativeAge
            | CohortKind::EditorActivity { .. }
            | CohortKind::EditorTrends { .. } => {
                acc.add_bytes(cohort, time, row.added(), row.removed());
                acc.add("edits", cohort, time, row.edits(EditCount::All) as f64);
                acc.add("editors", cohort, time, 1.0);
            }
            CohortKind::EditsHistogram { .. } => acc.add("editsHistogram", cohort, time, 1.0),
            CohortKind::EditorRoles { .. } => {
                acc.add("reverts", cohort, time, row.reverts.unwrap_or(0) as f64);
                acc.add("reverters", cohort, time, 1.0);
            }
            CohortKind::Reverts { action, .. } => {
                let action = action.as_str();
                acc.add(&format!("{action}_edits"), cohort, time, row.reverts.unwrap_or(0) as f64);
                acc.add(&format!("{action}_editors"), cohort, time, 1.0);
            }
            // flushed from the window instead
            CohortKind::NewEditorActivity { .. } => {}
        }
    }

    fn accumulate_window(&mut self, id: ContributorId, period: u32, row: &Row) -> Result<(), MissingField> {
        if self.is_bot(id) {
            return Ok(());
        }
        let month = row.month_key()?;

        if !matches!(&self.acc.window, Some(window) if window.contributor == id) {
            self.flush_window();
            let first_edit = row.first_edit_month_key()?;
            let last_month = add_months(&first_edit, period).unwrap_or_default();
            self.acc.window = Some(NewEditorWindow::open(id, self.time.get(&first_edit), last_month));
        }

        if !self.config.counts_namespace(row.namespace.as_deref()) {
            return Ok(());
        }
        if let Some(window) = self.acc.window.as_mut().filter(|w| w.contains(&month)) {
            window.absorb(row);
        }
        Ok(())
    }

    /// Moves the open new editor window into the accumulators
    fn flush_window(&mut self) {
        let Some(totals) = self.acc.window.take().and_then(NewEditorWindow::close) else { return };
        let CohortKind::NewEditorActivity { thresholds, .. } = &self.kind else { return };

        let cohort = index::histogram(totals.edits, thresholds);
        let time = totals.first_edit;
        self.acc.add("editors", cohort, time, 1.0);
        self.acc.add("edits", cohort, time, totals.edits as f64);
        self.acc.add("added", cohort, time, totals.added as f64);
        self.acc.add("removed", cohort, time, totals.removed as f64);
        self.acc.add("net", cohort, time, totals.net() as f64);
    }

    /// Drives `process_row` over the whole iterator and returns the number of
    /// rows consumed. Source errors carrying a row are handled by the row policy;
    /// any other error aborts the pass. A completed pass leaves the engine
    /// `Finalized`, so another pass needs `init_data` first.
    pub fn run_pass<I>(&mut self, rows: I) -> Result<u64, CohortError>
    where
        I: IntoIterator<Item = Result<Row, CohortError>>,
    {
        if matches!(self.state, EngineState::Uninitialized | EngineState::Finalized) {
            return Err(CohortError::NotInitialized);
        }
        let name = self.kind.name();
        info!(cohort = %name, "Aggregating rows");

        let mut count = 0u64;
        for item in rows {
            match item {
                Ok(row) => self.process_row(&row)?,
                Err(CohortError::RowProcessing { row, reason }) => self.reject(row, reason)?,
                Err(e) => return Err(e),
            }
            count += 1;
            if count % PROGRESS_EVERY == 0 {
                info!(cohort = %name, rows = count, "Processed {} million rows", count / PROGRESS_EVERY);
            }
        }

        self.flush_window();
        self.aggregated = true;
        self.state = EngineState::Finalized;
        info!(cohort = %name, rows = count, "Finished aggregation pass");
        Ok(count)
    }

    /// Derives bytes per edit and edits per editor where the cohort carries
    /// the inputs; the engine is read-only afterwards.
    pub fn finalize(&mut self) -> Result<(), CohortError> {
        if !self.aggregated {
            return Err(CohortError::NotAggregated(self.tag()));
        }
        self.flush_window();

        let cells = &self.acc.cells;
        let derived = match (cells.get("added"), cells.get("edits"), cells.get("editors")) {
            (Some(added), Some(edits), Some(editors)) => Some((ratio(added, edits), ratio(edits, editors))),
            _ => None,
        };
        match derived {
            Some((added_per_edit, edits_per_editor)) => {
                self.acc.cells.insert("addedPerEdit".into(), added_per_edit);
                self.acc.cells.insert("editsPerEditor".into(), edits_per_editor);
                kind::derived_descriptions(&mut self.descriptions, &self.kind.name());
                info!(cohort = %self.kind.name(), "Derived addedPerEdit and editsPerEditor");
            }
            None => info!(cohort = %self.kind.name(), "No manipulations after the data aggregation are implemented"),
        }

        self.state = EngineState::Finalized;
        Ok(())
    }

    /// Read-only export, available after a pass or a load from disk
    pub fn snapshot(&self) -> Result<Snapshot, CohortError> {
        if !self.aggregated {
            return Err(CohortError::NotAggregated(self.tag()));
        }
        Ok(self.partial_snapshot())
    }

    /// Export regardless of progress. Zero cells may simply not be aggregated yet.
    pub fn partial_snapshot(&self) -> Snapshot {
        Snapshot {
            cohort: self.kind.name(),
            tag: self.tag(),
            cohort_labels: self.definition.labels().to_vec(),
            time_buckets: self.time.buckets().to_vec(),
            metrics: self.acc.cells.clone(),
            descriptions: self.descriptions.clone(),
        }
    }

    /// Restores one metric saved by [`store::save_snapshot`]
    pub fn load_from_disk(&mut self, dir: &Path, metric: &str) -> Result<(), CohortError> {
        let path = store::metric_path(dir, metric, &self.tag());
        let matrix = store::read_matrix(&path)?;
        let expected = (self.definition.len(), self.time.len());
        if matrix.dim() != expected {
            return Err(CohortError::CorruptMatrix {
                path,
                reason: format!("shape {:?} does not match {expected:?}", matrix.dim()),
            });
        }

        self.acc.cells.insert(metric.to_string(), matrix);
        self.describe();
        self.aggregated = true;
        self.state = EngineState::Finalized;
        debug!(cohort = %self.kind.name(), metric, path = %path.display(), "Loaded matrix");
        Ok(())
    }

    /// Colorbar tick positions in `[0, 1]` with their labels
    pub fn colorbar_ticks_and_labels(&self, ncolors: usize) -> Vec<(f64, String)> {
        kind::colorbar(self.kind.tick_style(), &self.definition, ncolors)
    }
}

fn first_edit_year(row: &Row) -> Result<i32, MissingField> {
    row.first_edit_year.ok_or(MissingField("first_edit_year"))
}

/// Element-wise `num / den`, zero where the denominator is zero
fn ratio(num: &Matrix, den: &Matrix) -> Matrix {
    Matrix::from_shape_fn(num.raw_dim(), |cell| if den[cell] != 0.0 { num[cell] / den[cell] } else { 0.0 })
}
