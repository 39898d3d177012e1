// src/bots.rs

use crate::model::ContributorId;
use crate::source::read_id_list;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info};

/// Set of known automated accounts, consulted only when filtering is enabled.
///
/// Built once per run and shared read-only between engine instances.
#[derive(Debug, Clone, Default)]
pub struct BotFilter {
    enabled: bool,
    ids: HashSet<ContributorId>,
}

impl BotFilter {
    /// A filter that lets every contributor through
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = ContributorId>) -> Self {
        Self { enabled: true, ids: ids.into_iter().collect() }
    }

    /// Loads the bot list when `enabled`. A list that cannot be read leaves
    /// filtering disabled so the aggregation can still run.
    pub fn configure(enabled: bool, id_source: Option<&Path>) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let Some(path) = id_source else {
            error!("Bot filtering requested but no bot list configured, bots will not be filtered");
            return Self::disabled();
        };

        match read_id_list(path, "bot list") {
            Ok(ids) => {
                info!(path = %path.display(), bots = ids.len(), "Loaded bot list");
                Self::from_ids(ids)
            }
            Err(e) => {
                error!(error = %e, "Bot list could not be loaded, bots will not be filtered");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_bot(&self, id: ContributorId) -> bool {
        self.enabled && self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn disabled_filter_never_matches() {
        let filter = BotFilter::disabled();
        assert!(!filter.is_enabled());
        assert!(!filter.is_bot(7));
    }

    #[test]
    fn loads_one_id_per_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "7\n  42 \n\n").unwrap();

        let filter = BotFilter::configure(true, Some(file.path()));
        assert!(filter.is_enabled());
        assert_eq!(filter.len(), 2);
        assert!(filter.is_bot(42));
        assert!(!filter.is_bot(8));

        let off = BotFilter::configure(false, Some(file.path()));
        assert!(!off.is_bot(42));
    }

    #[test]
    fn missing_list_degrades_to_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let filter = BotFilter::configure(true, Some(dir.path().join("bots.tsv").as_path()));
        assert!(!filter.is_enabled());
        assert!(!filter.is_bot(42));

        assert!(!BotFilter::configure(true, None).is_enabled());
    }
}
