// src/cli.rs

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use wikipride::cohort::{AgeMode, CohortKind, RevertAction, RoleSets};
use wikipride::CohortError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cohort analysis of wiki contributions", long_about = None)]
pub struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Language of the wiki project to analyze, overrides the config file
    #[arg(short, long)]
    pub language: Option<String>,

    /// JSON-lines file with the aggregated revision rows, overrides the config file
    #[arg(short, long)]
    pub rows: Option<PathBuf>,

    /// Aggregate a single cohort instead of the standard report
    #[arg(long, value_enum)]
    pub cohort: Option<CohortChoice>,

    /// First edit year of the one year cohort
    #[arg(long)]
    pub year: Option<i32>,

    /// Revert action counted by the revert cohorts
    #[arg(long, value_enum, default_value_t = RevertAction::Reverted)]
    pub revert_action: RevertAction,

    /// Part of the workflow to run
    #[arg(value_enum, default_value_t = Workstep::All)]
    pub workstep: Workstep,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum Workstep {
    /// Data, then report
    All,
    /// Aggregate the cohort matrices and save them
    Data,
    /// Draw charts from saved matrices
    Report,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CohortChoice {
    AbsoluteAge,
    RelativeAge,
    RelativeAgeDays,
    ActiveAbsoluteAge,
    ActiveRelativeAge,
    EditsHistogram,
    EditorActivity,
    EditorTrends,
    Namespaces,
    EditorRoles,
    NewEditors,
    AbsoluteReverts,
    RelativeReverts,
    OneYear,
    ProjectSpace,
}

impl CohortChoice {
    pub fn kind(
        self,
        action: RevertAction,
        year: Option<i32>,
        roles: Option<Arc<RoleSets>>,
    ) -> Result<CohortKind, CohortError> {
        Ok(match self {
            CohortChoice::AbsoluteAge => CohortKind::AbsoluteAge,
            CohortChoice::RelativeAge => CohortKind::RelativeAge,
            CohortChoice::RelativeAgeDays => CohortKind::relative_age_days(),
            CohortChoice::ActiveAbsoluteAge => CohortKind::ActiveAbsoluteAge,
            CohortChoice::ActiveRelativeAge => CohortKind::ActiveRelativeAge,
            CohortChoice::EditsHistogram => CohortKind::edits_histogram(),
            CohortChoice::EditorActivity => CohortKind::editor_activity(),
            CohortChoice::EditorTrends => CohortKind::editor_trends(),
            CohortChoice::Namespaces => CohortKind::Namespaces,
            CohortChoice::EditorRoles => CohortKind::EditorRoles {
                roles: roles.ok_or_else(|| {
                    CohortError::Configuration("editor roles need the [roles] id lists".into())
                })?,
            },
            CohortChoice::NewEditors => CohortKind::new_editor_activity(),
            CohortChoice::AbsoluteReverts => CohortKind::Reverts { age: AgeMode::Absolute, action },
            CohortChoice::RelativeReverts => CohortKind::Reverts { age: AgeMode::Relative, action },
            CohortChoice::OneYear => CohortKind::OneYear {
                year: year.ok_or_else(|| CohortError::Configuration("the one year cohort needs --year".into()))?,
            },
            CohortChoice::ProjectSpace => CohortKind::project_space(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worksteps_and_cohorts() {
        let args = Args::try_parse_from(["wikipride", "-c", "wp.toml", "data"]).unwrap();
        assert_eq!(args.workstep, Workstep::Data);
        assert_eq!(args.cohort, None);
        assert_eq!(args.revert_action, RevertAction::Reverted);

        let args = Args::try_parse_from([
            "wikipride",
            "--config",
            "wp.toml",
            "--cohort",
            "relative-reverts",
            "--revert-action",
            "reverted-to",
            "-l",
            "pt",
        ])
        .unwrap();
        assert_eq!(args.workstep, Workstep::All);
        assert_eq!(args.language.as_deref(), Some("pt"));
        let kind = args.cohort.unwrap().kind(args.revert_action, args.year, None).unwrap();
        assert_eq!(kind.name(), "RelativeAgeReverts-revertedto");

        assert!(Args::try_parse_from(["wikipride", "-c", "wp.toml", "preprocessing"]).is_err());
    }

    #[test]
    fn editor_roles_require_role_lists() {
        assert!(matches!(
            CohortChoice::EditorRoles.kind(RevertAction::Reverting, None, None),
            Err(CohortError::Configuration(_))
        ));
        let roles = Some(Arc::new(RoleSets::default()));
        assert!(CohortChoice::EditorRoles.kind(RevertAction::Reverting, None, roles).is_ok());
    }

    #[test]
    fn one_year_cohorts_take_a_year() {
        let args =
            Args::try_parse_from(["wikipride", "-c", "wp.toml", "--cohort", "one-year", "--year", "2006", "report"]).unwrap();
        let kind = args.cohort.unwrap().kind(args.revert_action, args.year, None).unwrap();
        assert_eq!(kind.name(), "OneYearCohort2006");

        assert!(matches!(
            CohortChoice::OneYear.kind(RevertAction::Reverted, None, None),
            Err(CohortError::Configuration(_))
        ));
        let project = CohortChoice::ProjectSpace.kind(RevertAction::Reverted, None, None).unwrap();
        assert_eq!(project.name(), "ProjectSpaceCohorts");
    }
}
