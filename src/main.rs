//! logsweep scheduled service
//!
//! Runs retention sweeps over the configured target directory on a fixed
//! interval until SIGINT or SIGTERM is received.

use anyhow::{Context, Result};
use clap::Parser;
use common::cli::{CommonArgs, CommonCommands, utils};
use sweeper::{Scheduler, SweepMetrics, SweepOptions, Sweeper};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scheduled log retention sweeper", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    utils::init_logging(&args.common);

    let config = utils::load_config(args.common.config.as_ref())?;

    let command = args.command.unwrap_or_default();
    if utils::handle_common_command(&command, &config)? {
        return Ok(());
    }

    config.validate().context("Invalid configuration")?;

    if !config.schedule.enabled {
        log::info!("Scheduled sweeps are disabled (schedule.enabled = false)");
        log::info!("Set LOGSWEEP__SCHEDULE__ENABLED=true or use logsweep-run for one-shot sweeps");
        return Ok(());
    }

    log::info!("Starting logsweep service ({})", utils::version_info());

    let metrics = SweepMetrics::new();
    let options = SweepOptions::from(&config.sweeper);
    let sweeper = Sweeper::new(config.sweeper.clone(), options);
    let scheduler = Scheduler::new(sweeper, config.schedule.clone(), metrics);

    // Also resolves when the signal handlers cannot be installed.
    let shutdown = async {
        if let Err(e) = wait_for_shutdown_signal().await {
            log::error!("{e:#}");
        }
    };

    log::info!("logsweep service running, waiting for shutdown signal");
    let cycles = scheduler.run_until(shutdown).await;

    log::info!("logsweep service stopped after {cycles} sweep cycles");
    scheduler.metrics().summary().log();

    Ok(())
}
