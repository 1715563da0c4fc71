use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all logsweep binaries
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all binaries
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level selected by the verbosity flags.
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments.
    ///
    /// `RUST_LOG` takes precedence over the flags. Logs go to stderr so that
    /// stdout only carries the run report.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            let sweeper = &config.sweeper;
            println!("logsweep Configuration:");
            println!("======================");
            match &sweeper.target_directory {
                Some(dir) => println!("Target directory: {}", dir.display()),
                None => println!("Target directory: <unset>"),
            }
            match sweeper.default_max_age_days {
                Some(days) => println!("Default max age (days): {days}"),
                None => println!("Default max age (days): <unset, built-in fallback applies>"),
            }
            println!("File depth: {}", sweeper.file_depth);
            println!("Directory depth: {}", sweeper.dir_depth);
            println!("Include hidden: {}", sweeper.include_hidden);
            println!("Cascade empty dirs: {}", sweeper.cascade_empty_dirs);
            println!("Dry run: {}", sweeper.dry_run);
            println!("Failure mode: {:?}", sweeper.failure_mode);

            let schedule = &config.schedule;
            if schedule.enabled {
                println!("Schedule interval: {:?}", schedule.interval);
                println!("Run on start: {}", schedule.run_on_start);
                if let Some(timeout) = schedule.run_timeout {
                    println!("Run timeout: {timeout:?}");
                }
            } else {
                println!("Schedule: disabled");
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        config.validate().context("Invalid configuration")?;

        match &config.sweeper.target_directory {
            None => anyhow::bail!("Target directory is not set"),
            Some(dir) if dir.as_os_str().to_string_lossy().trim().is_empty() => {
                anyhow::bail!("Target directory cannot be empty")
            }
            Some(dir) if !dir.is_dir() => {
                log::warn!(
                    "Target directory {} does not exist yet, sweeps will find nothing to delete",
                    dir.display()
                );
            }
            Some(_) => {}
        }

        log::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true) // Command handled, don't start service
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
