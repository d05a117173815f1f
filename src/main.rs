//! Polling worker host
//!
//! Loads settings, configures logging and runs one periodic polling task per
//! configured definition until interrupted.

use anyhow::{Context, Result};
use clap::{Arg, Command, value_parser};
use log::{info, warn};
use pollwheel::PeriodicScheduler;
use pollwheel::config::{ProjectConfig, TaskDefinition};
use pollwheel::log_appender::setup_logging;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("pollwheel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run periodic polling tasks without overlapping runs")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Settings file (defaults to the user config directory)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("run-for")
                .long("run-for")
                .value_name("SECONDS")
                .help("Shut down after this many seconds instead of waiting for Ctrl-C")
                .value_parser(value_parser!(u64)),
        )
        .get_matches();

    let project_config = ProjectConfig::new(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("Failed to load project configuration")?;
    let settings = &project_config.settings;

    setup_logging(&project_config.log_dir(), settings.log_level_filter())
        .context("Failed to setup logging")?;

    let scheduler = PeriodicScheduler::new(settings.scheduler.clone())
        .context("Failed to create scheduler")?;
    for definition in &settings.tasks {
        register_polling_task(&scheduler, definition);
    }
    scheduler.start();

    match matches.get_one::<u64>("run-for") {
        Some(&secs) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("Run time of {}s elapsed", secs),
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }

    scheduler.shutdown();
    if !scheduler.drain(settings.scheduler.shutdown_grace).await {
        warn!("Exiting with work still in flight");
    }
    info!("Polling worker stopped");
    Ok(())
}

fn register_polling_task(scheduler: &PeriodicScheduler, definition: &TaskDefinition) {
    let name = definition.name.clone();
    let registered = scheduler.add_task(definition.id, definition.interval, move |_cancel| {
        let name = name.clone();
        async move {
            info!("{}", name);
            anyhow::Ok(())
        }
    });
    if !registered {
        warn!("Skipping task definition {} ({})", definition.id, definition.name);
    }
}
