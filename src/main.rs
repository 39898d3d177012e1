// src/main.rs

mod cli;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use cli::{Args, Workstep};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wikipride::bots::BotFilter;
use wikipride::cohort::RoleSets;
use wikipride::config::load_settings;
use wikipride::renderer::ChartOptions;
use wikipride::report;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikipride=info")))
        .init();

    let args = Args::parse();
    let start_time = Instant::now();

    let mut settings =
        load_settings(&args.config).with_context(|| format!("invalid config file {}", args.config.display()))?;
    if let Some(language) = &args.language {
        ensure!(language.chars().count() == 2, "language code should be two characters ({language})");
        settings.general.language = language.clone();
    }
    if let Some(rows) = &args.rows {
        settings.general.row_source = Some(rows.clone());
    }
    info!(
        language = %settings.general.language,
        start = %settings.general.start,
        end = %settings.general.end,
        "Starting cohort analysis"
    );

    let config = settings.engine_config();
    let bots = Arc::new(BotFilter::configure(config.filter_bots, settings.general.bot_file.as_deref()));
    let roles = RoleSets::load(&settings.roles)?.map(Arc::new);
    let options = ChartOptions::from_config(&settings.render);

    let (entries, data_root, graph_root) = match args.cohort {
        Some(choice) => (
            vec![report::single_entry(choice.kind(args.revert_action, args.year, roles)?, config)],
            settings.directories.data.clone(),
            settings.directories.wikipride.clone(),
        ),
        None => (
            report::standard_report(&config, roles),
            settings.directories.report.join("data"),
            settings.directories.report.join("graphs"),
        ),
    };

    if matches!(args.workstep, Workstep::All | Workstep::Data) {
        let step_start = Instant::now();
        let files =
            report::run_data_step(&entries, Arc::clone(&bots), settings.general.row_source.as_deref(), &data_root)?;
        info!(files = files.len(), elapsed = ?step_start.elapsed(), "Data step finished");
    }

    if matches!(args.workstep, Workstep::All | Workstep::Report) {
        let step_start = Instant::now();
        let charts = report::run_report_step(&entries, bots, &data_root, &graph_root, &options)?;
        if charts == 0 {
            warn!("No charts were drawn");
        }
        info!(charts, elapsed = ?step_start.elapsed(), "Report step finished");
    }

    info!(elapsed = ?start_time.elapsed(), "Total time");
    Ok(())
}
