// src/cohort/window.rs

use crate::model::{ContributorId, EditCount, Row};

/// Running totals of one contributor over their first months of activity.
///
/// Lives from the contributor's first row until the contributor id changes
/// (or the stream ends), at which point it is flushed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewEditorWindow {
    pub contributor: ContributorId,
    /// Time index of the first edit, `None` when it falls outside the analysis range
    pub first_edit: Option<usize>,
    /// Last month ("YYYYMM") still inside the window
    pub last_month: String,
    edits: i64,
    added: i64,
    removed: i64,
    rows: usize,
}

/// What a closed window contributes to the accumulators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowTotals {
    pub first_edit: usize,
    pub edits: i64,
    pub added: i64,
    pub removed: i64,
}

impl WindowTotals {
    pub fn net(&self) -> i64 {
        self.added + self.removed
    }
}

impl NewEditorWindow {
    pub fn open(contributor: ContributorId, first_edit: Option<usize>, last_month: String) -> Self {
        Self { contributor, first_edit, last_month, edits: 0, added: 0, removed: 0, rows: 0 }
    }

    pub fn contains(&self, month_key: &str) -> bool {
        self.first_edit.is_some() && month_key <= self.last_month.as_str()
    }

    pub fn absorb(&mut self, row: &Row) {
        self.edits += row.edits(EditCount::All);
        self.added += row.added();
        self.removed += row.removed();
        self.rows += 1;
    }

    /// Totals to flush, `None` when no row fell inside the window
    pub fn close(self) -> Option<WindowTotals> {
        let first_edit = self.first_edit?;
        (self.rows > 0).then_some(WindowTotals {
            first_edit,
            edits: self.edits,
            added: self.added,
            removed: self.removed,
        })
    }
}
