// src/cohort/kind.rs

use crate::config::{EngineConfig, RoleConfig};
use crate::error::CohortError;
use crate::model::{CohortDefinition, CohortKey, ContributorId, MetricDescription, Role, TickFormat};
use crate::source::read_id_list;
use crate::time_index::{month_key, TimeIndex};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Edit-count histogram bins used by the edit histogram and new editor cohorts
pub const EDIT_THRESHOLDS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];
/// Bins of the editor activity histogram
pub const ACTIVITY_THRESHOLDS: [u64; 6] = [1, 5, 50, 100, 500, 1000];
/// Overlapping activity levels of the editor trends
pub const ACTIVITY_LEVELS: [u64; 3] = [5, 10, 100];
pub const DAY_CYCLE: usize = 30;
/// Months after the first edit during which a contributor counts as new
pub const NEW_EDITOR_PERIOD: u32 = 3;
/// First edit years of the project namespace cohorts
pub const PROJECT_YEARS: [i32; 7] = [2004, 2005, 2006, 2007, 2008, 2009, 2010];

/// Too many colorbar labels are unreadable
const MAX_COLORBAR_LABELS: usize = 15;

/// What happens to a row whose fields cannot be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPolicy {
    /// Log the row and abort the pass
    Strict,
    /// Log the row and drop it
    Skip,
}

/// Layout of colorbar ticks in a WikiPride chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStyle {
    /// Ticks on color boundaries, labels sampled from the cohorts
    Edge,
    /// Centered ticks labelled with the half year of the cohort's first edit
    HalfYear,
    /// Ticks centered on colors, labels sampled from the cohorts
    Centered,
    /// One centered tick per cohort
    AllLabels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RevertAction {
    /// The act of rolling back
    Reverting,
    /// The revision that was rolled back
    Reverted,
    /// The revision rolled back to
    RevertedTo,
}

impl RevertAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RevertAction::Reverting => "reverting",
            RevertAction::Reverted => "reverted",
            RevertAction::RevertedTo => "revertedto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeMode {
    Absolute,
    Relative,
}

/// Contributor ids holding each community role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSets {
    administrators: HashSet<ContributorId>,
    tools: HashSet<ContributorId>,
    bots: HashSet<ContributorId>,
}

impl RoleSets {
    pub fn new(
        administrators: impl IntoIterator<Item = ContributorId>,
        tools: impl IntoIterator<Item = ContributorId>,
        bots: impl IntoIterator<Item = ContributorId>,
    ) -> Self {
        Self {
            administrators: administrators.into_iter().collect(),
            tools: tools.into_iter().collect(),
            bots: bots.into_iter().collect(),
        }
    }

    /// Loads the configured id lists, `None` when no list is configured at all
    pub fn load(config: &RoleConfig) -> Result<Option<Self>, CohortError> {
        if config.administrators.is_none() && config.tools.is_none() && config.bots.is_none() {
            return Ok(None);
        }

        fn ids(path: Option<&Path>, what: &'static str) -> Result<Vec<ContributorId>, CohortError> {
            match path {
                Some(path) => read_id_list(path, what),
                None => {
                    warn!(list = what, "Role list not configured, treating it as empty");
                    Ok(Vec::new())
                }
            }
        }

        let sets = Self::new(
            ids(config.administrators.as_deref(), "administrator list")?,
            ids(config.tools.as_deref(), "tool user list")?,
            ids(config.bots.as_deref(), "bot role list")?,
        );
        info!(
            administrators = sets.administrators.len(),
            tools = sets.tools.len(),
            bots = sets.bots.len(),
            "Loaded role lists"
        );
        Ok(Some(sets))
    }

    /// Administrators who also use the tool form their own cohort; otherwise
    /// bot beats administrator beats tool user.
    pub fn role_of(&self, id: ContributorId) -> Role {
        let admin = self.administrators.contains(&id);
        let tool = self.tools.contains(&id);
        if admin && tool {
            Role::Multiple
        } else if self.bots.contains(&id) {
            Role::Bot
        } else if admin {
            Role::Administrator
        } else if tool {
            Role::ToolUser
        } else {
            Role::Other
        }
    }
}

/// The closed set of cohort strategies
#[derive(Debug, Clone)]
pub enum CohortKind {
    /// Cohort = month of the first edit, per-namespace rows
    AbsoluteAge,
    /// Cohort = months since the first edit, per-namespace rows
    RelativeAge,
    /// Cohort = days since the first edit, folded into a cycle
    RelativeAgeDays { cycle: usize, cohorts: usize },
    /// Like `AbsoluteAge` over pre-aggregated rows, gated by the activation bounds
    ActiveAbsoluteAge,
    /// Like `RelativeAge` over pre-aggregated rows, gated by the activation bounds
    ActiveRelativeAge,
    /// Number of editors per monthly edit-count bin
    EditsHistogram { thresholds: Vec<u64> },
    /// Full metric set per monthly edit-count bin
    EditorActivity { thresholds: Vec<u64> },
    /// Overlapping activity levels, a row counts towards every level it reaches
    EditorTrends { levels: Vec<u64> },
    Namespaces,
    EditorRoles { roles: Arc<RoleSets> },
    /// Edit-count bin over the first `period` months of a contributor
    NewEditorActivity { period: u32, thresholds: Vec<u64> },
    Reverts { age: AgeMode, action: RevertAction },
    /// Contributors whose first edit fell in `year` against everybody else,
    /// over the months from January of that year
    OneYear { year: i32 },
    /// Cohort = year of the first edit, counting the project namespaces only
    ProjectSpace { years: Vec<i32> },
}

pub const STANDARD_METRICS: [&str; 5] = ["added", "removed", "net", "edits", "editors"];
const BYTE_METRICS: [&str; 4] = ["added", "removed", "net", "edits"];

impl CohortKind {
    pub fn relative_age_days() -> Self {
        CohortKind::RelativeAgeDays { cycle: DAY_CYCLE, cohorts: DAY_CYCLE }
    }

    pub fn edits_histogram() -> Self {
        CohortKind::EditsHistogram { thresholds: EDIT_THRESHOLDS.to_vec() }
    }

    pub fn editor_activity() -> Self {
        CohortKind::EditorActivity { thresholds: ACTIVITY_THRESHOLDS.to_vec() }
    }

    pub fn editor_trends() -> Self {
        CohortKind::EditorTrends { levels: ACTIVITY_LEVELS.to_vec() }
    }

    pub fn new_editor_activity() -> Self {
        CohortKind::NewEditorActivity { period: NEW_EDITOR_PERIOD, thresholds: EDIT_THRESHOLDS.to_vec() }
    }

    pub fn project_space() -> Self {
        CohortKind::ProjectSpace { years: PROJECT_YEARS.to_vec() }
    }

    pub fn name(&self) -> String {
        match self {
            CohortKind::AbsoluteAge => "AbsoluteAgePerMonth".into(),
            CohortKind::RelativeAge => "RelativeAgePerMonth".into(),
            CohortKind::RelativeAgeDays { .. } => "RelativeAgePerDay".into(),
            CohortKind::ActiveAbsoluteAge => "AbsoluteAgeAllNamespaces".into(),
            CohortKind::ActiveRelativeAge => "RelativeAgeAllNamespaces".into(),
            CohortKind::EditsHistogram { .. } => "EditsHistogram".into(),
            CohortKind::EditorActivity { .. } => "EditorActivity".into(),
            CohortKind::EditorTrends { .. } => "EditorTrends".into(),
            CohortKind::Namespaces => "Namespaces".into(),
            CohortKind::EditorRoles { .. } => "EditorRoles".into(),
            CohortKind::NewEditorActivity { .. } => "NewEditorActivity".into(),
            CohortKind::Reverts { age: AgeMode::Absolute, action } => format!("AbsoluteAgeReverts-{}", action.as_str()),
            CohortKind::Reverts { age: AgeMode::Relative, action } => format!("RelativeAgeReverts-{}", action.as_str()),
            CohortKind::OneYear { year } => format!("OneYearCohort{year}"),
            CohortKind::ProjectSpace { .. } => "ProjectSpaceCohorts".into(),
        }
    }

    /// The per-namespace age family, the year cohorts and the windowed new
    /// editor cohort read raw per-contributor rows and abort on a bad one.
    pub fn row_policy(&self) -> RowPolicy {
        match self {
            CohortKind::AbsoluteAge
            | CohortKind::RelativeAge
            | CohortKind::RelativeAgeDays { .. }
            | CohortKind::NewEditorActivity { .. }
            | CohortKind::OneYear { .. }
            | CohortKind::ProjectSpace { .. } => RowPolicy::Strict,
            _ => RowPolicy::Skip,
        }
    }

    /// Whether the activation bounds gate rows of this kind
    pub fn uses_activation(&self) -> bool {
        matches!(
            self,
            CohortKind::ActiveAbsoluteAge
                | CohortKind::ActiveRelativeAge
                | CohortKind::EditsHistogram { .. }
                | CohortKind::EditorActivity { .. }
                | CohortKind::Reverts { .. }
                | CohortKind::OneYear { .. }
                | CohortKind::ProjectSpace { .. }
        )
    }

    /// Names of the accumulator matrices, in a stable order
    pub fn metrics(&self) -> Vec<String> {
        let names: Vec<&str> = match self {
            CohortKind::RelativeAgeDays { .. }
            | CohortKind::Namespaces
            | CohortKind::OneYear { .. }
            | CohortKind::ProjectSpace { .. } => BYTE_METRICS.to_vec(),
            CohortKind::EditsHistogram { .. } => vec!["editsHistogram"],
            CohortKind::EditorRoles { .. } => vec!["reverts", "reverters"],
            CohortKind::Reverts { action, .. } => {
                return vec![format!("{}_edits", action.as_str()), format!("{}_editors", action.as_str())]
            }
            _ => STANDARD_METRICS.to_vec(),
        };
        names.into_iter().map(String::from).collect()
    }

    pub fn validate(&self) -> Result<(), CohortError> {
        fn ascending(values: &[u64], what: &str) -> Result<(), CohortError> {
            if values.is_empty() {
                return Err(CohortError::Configuration(format!("{what} must not be empty")));
            }
            if values.windows(2).any(|w| w[0] >= w[1]) {
                return Err(CohortError::Configuration(format!("{what} must be strictly ascending: {values:?}")));
            }
            Ok(())
        }

        match self {
            CohortKind::RelativeAgeDays { cycle, cohorts } if *cycle == 0 || *cohorts == 0 => Err(
                CohortError::Configuration("day cycle and cohort count must be positive".into()),
            ),
            CohortKind::EditsHistogram { thresholds }
            | CohortKind::EditorActivity { thresholds }
            | CohortKind::NewEditorActivity { thresholds, .. } => ascending(thresholds, "edit thresholds"),
            CohortKind::EditorTrends { levels } => ascending(levels, "activity levels"),
            CohortKind::ProjectSpace { years } => {
                if years.is_empty() {
                    return Err(CohortError::Configuration("cohort years must not be empty".into()));
                }
                if years.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(CohortError::Configuration(format!("cohort years must be strictly ascending: {years:?}")));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Day cohorts run on a daily index spanning the configured months, a
    /// single year cohort starts in January of its year
    pub(crate) fn time_index(&self, config: &EngineConfig) -> Result<TimeIndex, CohortError> {
        match self {
            CohortKind::RelativeAgeDays { .. } => {
                TimeIndex::days_spanning(&config.time_range_start, &config.time_range_end)
            }
            CohortKind::OneYear { year } => TimeIndex::build(&month_key(*year, 1), &config.time_range_end),
            _ => TimeIndex::build(&config.time_range_start, &config.time_range_end),
        }
    }

    pub(crate) fn definition(&self, time: &TimeIndex) -> Result<CohortDefinition, CohortError> {
        let (keys, labels): (Vec<CohortKey>, Vec<String>) = match self {
            CohortKind::AbsoluteAge
            | CohortKind::ActiveAbsoluteAge
            | CohortKind::Reverts { age: AgeMode::Absolute, .. } => time
                .buckets()
                .iter()
                .enumerate()
                .map(|(i, key)| (CohortKey::Bucket(key.clone()), time.label(i).unwrap_or_default()))
                .unzip(),
            CohortKind::RelativeAge
            | CohortKind::ActiveRelativeAge
            | CohortKind::Reverts { age: AgeMode::Relative, .. } => {
                (0..time.len()).map(|i| (CohortKey::Age(i), format!("{i} month old"))).unzip()
            }
            CohortKind::RelativeAgeDays { cohorts, .. } => {
                (0..*cohorts).map(|i| (CohortKey::Age(i), format!("{i} days old"))).unzip()
            }
            CohortKind::EditsHistogram { thresholds }
            | CohortKind::EditorActivity { thresholds }
            | CohortKind::NewEditorActivity { thresholds, .. } => threshold_cohorts(thresholds),
            CohortKind::EditorTrends { levels } => levels
                .iter()
                .map(|&l| (CohortKey::AtLeast(l), format!("{l}+ edits")))
                .unzip(),
            CohortKind::Namespaces => crate::cohort::index::NAMESPACES
                .iter()
                .map(|ns| (CohortKey::Namespace(ns.to_string()), format!("{ns} namespace")))
                .chain(std::iter::once((CohortKey::OtherNamespace, "other namespace".to_string())))
                .unzip(),
            CohortKind::EditorRoles { .. } => Role::ALL
                .iter()
                .map(|&role| (CohortKey::Role(role), role.label().to_string()))
                .unzip(),
            CohortKind::OneYear { year } => (
                vec![CohortKey::Year(*year), CohortKey::OtherYears],
                vec![format!("{year} cohort"), "others cohort".to_string()],
            ),
            CohortKind::ProjectSpace { years } => {
                years.iter().map(|&y| (CohortKey::Year(y), format!("{y} cohort"))).unzip()
            }
        };
        CohortDefinition::new(keys, labels)
    }

    pub(crate) fn descriptions(
        &self,
        config: &EngineConfig,
        bots_filtered: bool,
    ) -> BTreeMap<String, MetricDescription> {
        let bots = if bots_filtered { "no bots" } else { "including bots" };
        let namespaces = config.namespace_label();
        let activation = match config.activation_max {
            Some(max) => format!("{}-{} edits", config.activation_min, max - 1),
            None => format!("{}+ edits", config.activation_min),
        };

        let mut map = BTreeMap::new();
        match self {
            CohortKind::AbsoluteAge | CohortKind::RelativeAge => {
                let context = format!("{bots}, namespaces:{namespaces}");
                byte_metrics(&mut map, "", &context);
                count(&mut map, "editors", format!("Number of editors active ({context})"), "Editors");
            }
            CohortKind::RelativeAgeDays { .. } => {
                byte_metrics(&mut map, "per day ", &format!("{bots}, namespaces:{namespaces}"));
            }
            CohortKind::ActiveAbsoluteAge | CohortKind::ActiveRelativeAge | CohortKind::EditorActivity { .. } => {
                let context = format!("{activation}, {bots}, namespaces:{namespaces}");
                byte_metrics(&mut map, "by editor activity ", &context);
                count(&mut map, "editors", format!("Active editor histogram ({context})"), "Number of Editors");
            }
            CohortKind::EditorTrends { .. } => {
                let context = format!("{bots}, namespaces:{namespaces}");
                byte_metrics(&mut map, "by activity level ", &context);
                count(&mut map, "editors", format!("Active editors by activity level ({context})"), "Editors");
            }
            CohortKind::NewEditorActivity { period, .. } => {
                let context = format!("<{period} months, {bots}, namespaces:{namespaces}");
                byte_metrics(&mut map, "by new editor activity ", &context);
                count(
                    &mut map,
                    "editors",
                    format!("Edits histogram for the first {period} months of activity ({bots}, namespaces:{namespaces})"),
                    "Number of Editors",
                );
            }
            CohortKind::Namespaces => byte_metrics(&mut map, "to namespaces ", bots),
            CohortKind::EditsHistogram { .. } => count(
                &mut map,
                "editsHistogram",
                format!("Histogram of the number of edits ({activation}, {bots}, namespaces:{namespaces})"),
                "Number of Editors",
            ),
            CohortKind::EditorRoles { .. } => {
                count(&mut map, "reverts", "Number of reverts by editor role".into(), "Reverts");
                count(&mut map, "reverters", "Reverter histogram by editor role".into(), "Number of Reverters");
            }
            CohortKind::Reverts { action, .. } => {
                let action = action.as_str();
                let context = format!("{}+ reverts, {bots}", config.activation_min);
                count(
                    &mut map,
                    &format!("{action}_edits"),
                    format!("Number of {action} actions by editor age ({context})"),
                    "Reverts",
                );
                count(
                    &mut map,
                    &format!("{action}_editors"),
                    format!("Editor histogram for {action} actions ({context})"),
                    "Number of Editors",
                );
            }
            CohortKind::OneYear { year } => {
                let context = format!("{activation}/month, {bots}, namespaces:{namespaces}");
                byte_metrics(&mut map, &format!("by the {year} cohort "), &context);
            }
            CohortKind::ProjectSpace { .. } => {
                byte_metrics(&mut map, "to project namespaces ", &format!("{activation}/month, {bots}"));
            }
        }
        map
    }

    pub(crate) fn tick_style(&self) -> TickStyle {
        match self {
            CohortKind::ActiveAbsoluteAge | CohortKind::Reverts { age: AgeMode::Absolute, .. } => TickStyle::HalfYear,
            CohortKind::AbsoluteAge
            | CohortKind::RelativeAge
            | CohortKind::RelativeAgeDays { .. }
            | CohortKind::ActiveRelativeAge
            | CohortKind::Reverts { age: AgeMode::Relative, .. }
            | CohortKind::ProjectSpace { .. } => TickStyle::Edge,
            CohortKind::EditsHistogram { .. }
            | CohortKind::EditorActivity { .. }
            | CohortKind::EditorTrends { .. }
            | CohortKind::NewEditorActivity { .. } => TickStyle::Centered,
            CohortKind::Namespaces | CohortKind::EditorRoles { .. } | CohortKind::OneYear { .. } => TickStyle::AllLabels,
        }
    }
}

fn threshold_cohorts(thresholds: &[u64]) -> (Vec<CohortKey>, Vec<String>) {
    let mut keys = Vec::with_capacity(thresholds.len() + 1);
    let mut labels = Vec::with_capacity(thresholds.len() + 1);
    let mut previous = 0;
    for &t in thresholds {
        keys.push(CohortKey::UpTo(t));
        labels.push(match (previous + 1, t) {
            (1, 1) => "1 edit".to_string(),
            (low, high) if low == high => format!("{high} edits"),
            (low, high) => format!("{low}-{high} edits"),
        });
        previous = t;
    }
    keys.push(CohortKey::Beyond(previous));
    labels.push(format!(">{previous} edits"));
    (keys, labels)
}

fn byte_metrics(map: &mut BTreeMap<String, MetricDescription>, subject: &str, context: &str) {
    for (metric, what) in [("added", "added"), ("removed", "removed"), ("net", "added-removed")] {
        map.insert(
            metric.to_string(),
            MetricDescription {
                title: format!("Megabytes {what} {subject}({context})"),
                ylabel: "Megabytes".into(),
                ytick: Some(TickFormat::Megabytes),
            },
        );
    }
    count(map, "edits", format!("Number of edits {subject}({context})"), "Edits");
}

fn count(map: &mut BTreeMap<String, MetricDescription>, metric: &str, title: String, ylabel: &str) {
    map.insert(metric.to_string(), MetricDescription { title, ylabel: ylabel.into(), ytick: None });
}

/// Descriptions of the metrics derived in `finalize`
pub(crate) fn derived_descriptions(map: &mut BTreeMap<String, MetricDescription>, subject: &str) {
    count(map, "addedPerEdit", format!("Bytes added per edit ({subject})"), "Bytes");
    count(map, "editsPerEditor", format!("Edits per active editor ({subject})"), "Edits");
}

/// `n` evenly spaced values over `[start, end]`
pub(crate) fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Colorbar tick positions in `[0, 1]` with their labels
pub(crate) fn colorbar(style: TickStyle, definition: &CohortDefinition, ncolors: usize) -> Vec<(f64, String)> {
    let cohorts = definition.len();
    let labels = definition.labels();
    let ncolors = ncolors.max(1);

    let sampled = |nlabels: usize| -> Vec<usize> {
        linspace(0.0, cohorts.saturating_sub(1) as f64, nlabels)
            .into_iter()
            .map(|v| v as usize)
            .collect()
    };
    let centered = |nlabels: usize| -> Vec<f64> {
        let n = nlabels.max(1) as f64;
        linspace(0.0, 1.0 - 1.0 / n, nlabels).into_iter().map(|v| v + 0.5 / n).collect()
    };

    match style {
        TickStyle::Edge => {
            let nlabels = (ncolors + 1).min(MAX_COLORBAR_LABELS);
            linspace(0.0, 1.0, nlabels)
                .into_iter()
                .zip(sampled(nlabels))
                .map(|(tick, i)| (tick, labels[i].clone()))
                .collect()
        }
        TickStyle::HalfYear => {
            let nlabels = (ncolors + 1).min(MAX_COLORBAR_LABELS);
            centered(nlabels)
                .into_iter()
                .zip(sampled(nlabels))
                .map(|(tick, i)| (tick, half_year(&definition.keys()[i]).unwrap_or_else(|| labels[i].clone())))
                .collect()
        }
        TickStyle::Centered => centered(ncolors)
            .into_iter()
            .zip(sampled(ncolors))
            .map(|(tick, i)| (tick, labels[i].clone()))
            .collect(),
        TickStyle::AllLabels => centered(cohorts).into_iter().zip(labels.iter().cloned()).collect(),
    }
}

fn half_year(key: &CohortKey) -> Option<String> {
    let CohortKey::Bucket(bucket) = key else { return None };
    let month: u32 = bucket.get(4..6)?.parse().ok()?;
    let half = if month <= 6 { "1-6" } else { "7-12" };
    Some(format!("{half} / {}", bucket.get(..4)?))
}
