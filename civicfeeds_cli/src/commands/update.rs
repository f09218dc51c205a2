//! The `update` subcommand: run the selected scrapers one after another.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use civicfeeds_lib::civicfeeds_transport::ChromiumLauncher;
use civicfeeds_lib::Orchestrator;
use indicatif::{ProgressBar, ProgressStyle};

use crate::output;

/// Arguments for the `update` subcommand.
#[derive(Args)]
pub struct UpdateArgs {
    /// Run every source marked `enabled` in the config
    #[arg(long, conflicts_with = "source")]
    pub all: bool,

    /// Run a named source (repeatable), e.g. --source bellingham_crime
    #[arg(long, value_name = "NAME")]
    pub source: Vec<String>,
}

/// Source keys to run, in run order.
pub fn selected_sources(args: &UpdateArgs, enabled: &[&str]) -> Vec<String> {
    if args.all {
        enabled.iter().map(|s| s.to_string()).collect()
    } else {
        args.source.clone()
    }
}

pub async fn run(args: &UpdateArgs, config_path: &Path) -> Result<()> {
    let (config, root) = super::load(config_path)?;
    let keys = selected_sources(args, &config.enabled_sources());
    if keys.is_empty() {
        bail!("no sources selected; use --all or --source NAME");
    }

    tracing::info!("Running {} source(s) under {}", keys.len(), root.display());
    let orchestrator = Orchestrator::new(config, root, Arc::new(ChromiumLauncher));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("running {}...", keys.join(", ")));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let summary = orchestrator.run_sources(&keys).await;
    spinner.finish_and_clear();
    for report in &summary.reports {
        println!("{}", output::status_line(report));
    }
    println!();
    output::print_summary_table(&summary);
    println!("Successful: {}/{}", summary.succeeded(), summary.total());

    if !summary.all_succeeded() {
        bail!(
            "{} of {} sources did not succeed",
            summary.total() - summary.succeeded(),
            summary.total()
        );
    }
    Ok(())
}
