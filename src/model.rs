// src/model.rs

use crate::error::CohortError;
use ndarray::Array2;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Uniquely identifies a contributor
pub type ContributorId = u64;

/// One cohort × time-bucket grid holding a single summed metric
pub type Matrix = Array2<f64>;

/// One result row delivered by the data source. The engine never mutates it.
///
/// Field names follow the aggregated revision tables; every field is optional
/// so that a missing value can be told apart from a zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, alias = "user_id")]
    pub contributor_id: Option<ContributorId>,
    #[serde(default, alias = "rev_year")]
    pub year: Option<i32>,
    #[serde(default, alias = "rev_month")]
    pub month: Option<u32>,
    #[serde(default, alias = "rev_day")]
    pub day: Option<u32>,
    #[serde(default, deserialize_with = "namespace_from_any")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub first_edit_year: Option<i32>,
    #[serde(default)]
    pub first_edit_month: Option<u32>,
    #[serde(default)]
    pub first_edit_day: Option<u32>,
    #[serde(default)]
    pub len_added: Option<i64>,
    #[serde(default)]
    pub len_removed: Option<i64>,
    #[serde(default)]
    pub add_edits: Option<i64>,
    #[serde(default)]
    pub remove_edits: Option<i64>,
    #[serde(default)]
    pub noop_edits: Option<i64>,
    /// Pre-aggregated edit total, preferred over the per-type counts when present
    #[serde(default)]
    pub total_edits: Option<i64>,
    #[serde(default)]
    pub reverts: Option<i64>,
}

/// Namespaces arrive either as numbers or as strings depending on the source
fn namespace_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("invalid namespace: {other}"))),
    }
}

/// A required row field was absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField(pub &'static str);

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing field '{}'", self.0)
    }
}

/// Which edit-type counts make up a row's edit total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditCount {
    AddRemove,
    All,
}

fn require<T: Copy>(value: Option<T>, name: &'static str) -> Result<T, MissingField> {
    value.ok_or(MissingField(name))
}

impl Row {
    pub fn contributor(&self) -> Result<ContributorId, MissingField> {
        require(self.contributor_id, "contributor_id")
    }

    /// "YYYYMM" of the revision
    pub fn month_key(&self) -> Result<String, MissingField> {
        Ok(format!("{:04}{:02}", require(self.year, "year")?, require(self.month, "month")?))
    }

    /// "YYYYMMDD" of the revision
    pub fn day_key(&self) -> Result<String, MissingField> {
        Ok(format!("{}{:02}", self.month_key()?, require(self.day, "day")?))
    }

    pub fn first_edit_month_key(&self) -> Result<String, MissingField> {
        Ok(format!(
            "{:04}{:02}",
            require(self.first_edit_year, "first_edit_year")?,
            require(self.first_edit_month, "first_edit_month")?
        ))
    }

    pub fn first_edit_day_key(&self) -> Result<String, MissingField> {
        Ok(format!(
            "{}{:02}",
            self.first_edit_month_key()?,
            require(self.first_edit_day, "first_edit_day")?
        ))
    }

    /// Bytes added, never negative
    pub fn added(&self) -> i64 {
        self.len_added.unwrap_or(0).max(0)
    }

    /// Bytes removed, stored negative so that `added + removed` is the net change
    pub fn removed(&self) -> i64 {
        -self.len_removed.unwrap_or(0).abs()
    }

    pub fn edits(&self, count: EditCount) -> i64 {
        let add_remove = self.add_edits.unwrap_or(0) + self.remove_edits.unwrap_or(0);
        match count {
            EditCount::AddRemove => add_remove,
            EditCount::All => self
                .total_edits
                .unwrap_or(add_remove + self.noop_edits.unwrap_or(0)),
        }
    }

    /// Textual dump used when reporting a bad row
    pub fn dump(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Community role of a contributor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    ToolUser,
    Bot,
    /// Administrator who is also a tool user
    Multiple,
    Other,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Administrator, Role::ToolUser, Role::Bot, Role::Multiple, Role::Other];

    /// Position of the role's cohort
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::ToolUser => "Tool user",
            Role::Bot => "Bot",
            Role::Multiple => "Administrator & tool user",
            Role::Other => "Other",
        }
    }
}

/// Opaque identity of one cohort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortKey {
    /// Contributors whose first edit fell in this bucket
    Bucket(String),
    /// Contributors of this age, in buckets since their first edit
    Age(usize),
    /// At most this many edits (and more than the previous threshold)
    UpTo(u64),
    /// More edits than the largest threshold
    Beyond(u64),
    /// At least this many edits; cohorts of this kind overlap
    AtLeast(u64),
    /// Contributors whose first edit fell in this year
    Year(i32),
    /// Everybody outside the year cohorts
    OtherYears,
    Namespace(String),
    OtherNamespace,
    Role(Role),
}

/// Ordered cohorts and their display labels, fixed for the lifetime of an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortDefinition {
    keys: Vec<CohortKey>,
    labels: Vec<String>,
}

impl CohortDefinition {
    pub fn new(keys: Vec<CohortKey>, labels: Vec<String>) -> Result<Self, CohortError> {
        if keys.len() != labels.len() {
            return Err(CohortError::Configuration(format!(
                "{} cohorts but {} cohort labels",
                keys.len(),
                labels.len()
            )));
        }
        if keys.is_empty() {
            return Err(CohortError::Configuration("a cohort definition needs at least one cohort".into()));
        }
        Ok(Self { keys, labels })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[CohortKey] {
        &self.keys
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// How axis ticks of a metric are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickFormat {
    /// Bytes shown as whole megabytes
    Megabytes,
}

impl TickFormat {
    pub fn format(self, value: f64) -> String {
        match self {
            TickFormat::Megabytes => format!("{}", (value / 1e6) as i64),
        }
    }
}

/// Display information of one metric, consumed by the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescription {
    pub title: String,
    pub ylabel: String,
    pub ytick: Option<TickFormat>,
}

/// Read-only export of an engine's accumulators
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Name of the cohort kind
    pub cohort: String,
    /// Cohort name plus bot and namespace filter state, used to build file names
    pub tag: String,
    pub cohort_labels: Vec<String>,
    pub time_buckets: Vec<String>,
    pub metrics: BTreeMap<String, Matrix>,
    pub descriptions: BTreeMap<String, MetricDescription>,
}

impl Snapshot {
    pub fn metric(&self, name: &str) -> Option<&Matrix> {
        self.metrics.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_accept_source_column_names() {
        let row: Row = serde_json::from_str(
            r#"{"user_id": 3, "rev_year": 2004, "rev_month": 2, "namespace": 0,
                "first_edit_year": 2004, "first_edit_month": 1, "len_added": 10,
                "len_removed": null, "add_edits": 2, "remove_edits": 1, "noop_edits": 4}"#,
        )
        .unwrap();

        assert_eq!(row.contributor(), Ok(3));
        assert_eq!(row.month_key().unwrap(), "200402");
        assert_eq!(row.first_edit_month_key().unwrap(), "200401");
        assert_eq!(row.namespace.as_deref(), Some("0"));
        assert_eq!(row.removed(), 0);
        assert_eq!(row.edits(EditCount::AddRemove), 3);
        assert_eq!(row.edits(EditCount::All), 7);
        assert_eq!(row.day_key(), Err(MissingField("day")));
    }

    #[test]
    fn removed_bytes_are_negative_either_way() {
        let negative = Row { len_removed: Some(-40), ..Row::default() };
        let positive = Row { len_removed: Some(40), ..Row::default() };
        assert_eq!(negative.removed(), -40);
        assert_eq!(positive.removed(), -40);
    }

    #[test]
    fn total_edits_wins_when_present() {
        let row = Row { total_edits: Some(100), add_edits: Some(1), ..Row::default() };
        assert_eq!(row.edits(EditCount::All), 100);
        assert_eq!(row.edits(EditCount::AddRemove), 1);
    }

    #[test]
    fn definition_requires_matching_labels() {
        let err = CohortDefinition::new(vec![CohortKey::Age(0), CohortKey::Age(1)], vec!["0".into()]);
        assert!(matches!(err, Err(CohortError::Configuration(_))));
        assert!(CohortDefinition::new(vec![], vec![]).is_err());
    }

    #[test]
    fn megabyte_ticks() {
        assert_eq!(TickFormat::Megabytes.format(3_500_000.0), "3");
    }
}
