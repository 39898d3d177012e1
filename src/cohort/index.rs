// src/cohort/index.rs

//! Pure functions mapping a row's derived keys to cohort indices.

/// Cohorts a row updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortIndex {
    /// No matching cohort, the row is dropped
    Outside,
    One(usize),
    /// Overlapping cohorts, every listed cell is updated
    Many(Vec<usize>),
}

impl CohortIndex {
    pub fn cohorts(&self) -> &[usize] {
        match self {
            CohortIndex::Outside => &[],
            CohortIndex::One(i) => std::slice::from_ref(i),
            CohortIndex::Many(all) => all,
        }
    }
}

impl From<Option<usize>> for CohortIndex {
    fn from(index: Option<usize>) -> Self {
        index.map_or(CohortIndex::Outside, CohortIndex::One)
    }
}

/// Namespaces that get their own cohort; everything else lands in the last one
pub const NAMESPACES: [&str; 6] = ["0", "1", "2", "3", "4", "5"];

/// The cohort of a contributor is the time index of their first edit
pub fn absolute_age(first_edit: usize) -> usize {
    first_edit
}

/// Buckets elapsed since the first edit, `None` when negative or past the last cohort
pub fn relative_age(current: usize, first_edit: usize, cohorts: usize) -> Option<usize> {
    current.checked_sub(first_edit).filter(|age| *age < cohorts)
}

/// Elapsed days folded into a cycle, clamped to the last cohort
pub fn day_of_cycle(current: usize, first_edit: usize, cycle: usize, cohorts: usize) -> Option<usize> {
    let elapsed = current.checked_sub(first_edit)?;
    if cycle == 0 || cohorts == 0 {
        return None;
    }
    Some((elapsed % cycle).min(cohorts - 1))
}

/// First threshold the edit count does not exceed; the index past the last
/// threshold is the open-ended catch-all.
pub fn histogram(edits: i64, thresholds: &[u64]) -> usize {
    thresholds
        .iter()
        .position(|&t| edits <= t as i64)
        .unwrap_or(thresholds.len())
}

/// Every activity level the total reaches. One row may belong to several cohorts.
pub fn activity_levels(total: i64, levels: &[u64]) -> impl Iterator<Item = usize> + '_ {
    levels
        .iter()
        .enumerate()
        .filter(move |&(_, &level)| total >= level as i64)
        .map(|(i, _)| i)
}

/// Namespaces counted by the project namespace cohorts
pub const PROJECT_NAMESPACES: [&str; 2] = ["4", "5"];

pub fn is_project_namespace(ns: &str) -> bool {
    PROJECT_NAMESPACES.contains(&ns)
}

pub fn namespace(ns: &str) -> usize {
    NAMESPACES
        .iter()
        .position(|&known| known == ns)
        .unwrap_or(NAMESPACES.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_age_is_bounds_checked() {
        assert_eq!(relative_age(3, 3, 10), Some(0));
        assert_eq!(relative_age(8, 3, 10), Some(5));
        assert_eq!(relative_age(2, 3, 10), None);
        assert_eq!(relative_age(13, 3, 10), None);
    }

    #[test]
    fn days_wrap_around_the_cycle() {
        let folded: Vec<_> = [29, 30, 59, 60]
            .iter()
            .map(|&elapsed| day_of_cycle(100 + elapsed, 100, 30, 30))
            .collect();
        assert_eq!(folded, vec![Some(29), Some(0), Some(29), Some(0)]);

        assert_eq!(day_of_cycle(29, 0, 30, 10), Some(9));
        assert_eq!(day_of_cycle(0, 1, 30, 30), None);
    }

    #[test]
    fn histogram_boundaries() {
        let thresholds = [1, 5, 10];
        assert_eq!(histogram(1, &thresholds), 0);
        assert_eq!(histogram(5, &thresholds), 1);
        assert_eq!(histogram(6, &thresholds), 2);
        assert_eq!(histogram(10, &thresholds), 2);
        assert_eq!(histogram(11, &thresholds), 3);
    }

    #[test]
    fn activity_levels_overlap() {
        let levels = [5, 10, 100];
        assert_eq!(activity_levels(100, &levels).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(activity_levels(7, &levels).collect::<Vec<_>>(), vec![0]);
        assert_eq!(activity_levels(4, &levels).count(), 0);
    }

    #[test]
    fn cohort_index_slices() {
        assert!(CohortIndex::from(None).cohorts().is_empty());
        assert_eq!(CohortIndex::from(Some(3)).cohorts(), &[3]);
        assert_eq!(CohortIndex::Many(vec![0, 2]).cohorts(), &[0, 2]);
    }

    #[test]
    fn unknown_namespaces_share_a_cohort() {
        assert_eq!(namespace("0"), 0);
        assert_eq!(namespace("5"), 5);
        assert_eq!(namespace("14"), 6);
        assert_eq!(namespace("talk"), 6);
    }

    #[test]
    fn project_namespaces() {
        assert!(is_project_namespace("4"));
        assert!(is_project_namespace("5"));
        assert!(!is_project_namespace("0"));
        assert!(!is_project_namespace("14"));
    }
}
