//! logsweep-run: one-shot log retention sweep.
//!
//! Meant to be invoked by an external scheduler. The process exit status is
//! the status of the run: `0` on success, the OS error code of a failed
//! deletion, or `78` for configuration errors.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::cli::{CommonArgs, utils};
use std::path::PathBuf;
use std::process::ExitCode;
use sweeper::error::EX_CONFIG;
use sweeper::{ExitStatus, Invocation, SweepError, SweepOptions, Sweeper, TextReporter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one log retention sweep", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a sweep (default)
    Run(RunArgs),
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Directory to sweep (overrides sweeper.target_directory)
    #[arg(long, value_name = "DIR")]
    target_dir: Option<PathBuf>,

    /// Retention threshold in days (overrides the stored default)
    #[arg(long, value_name = "DAYS", conflicts_with = "conf")]
    max_age_days: Option<u64>,

    /// Run configuration as JSON, e.g. '{"maxLogAgeInDays": 30}'
    #[arg(long, value_name = "JSON")]
    conf: Option<String>,

    /// Report what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn invocation(&self) -> Result<Invocation, SweepError> {
        let mut invocation = match &self.conf {
            Some(conf) => Invocation::from_run_conf(conf)?,
            None => Invocation::default(),
        };
        if let Some(days) = self.max_age_days {
            invocation = invocation.with_max_age_days(days);
        }
        if let Some(dir) = &self.target_dir {
            invocation = invocation.with_target_directory(dir);
        }
        Ok(invocation)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    match run(cli) {
        Ok(status) => exit_code(status),
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("Error: {err:#}");
            exit_code(ExitStatus::Failure(EX_CONFIG))
        }
    }
}

fn run(cli: Cli) -> Result<ExitStatus> {
    let config = utils::load_config(cli.common.config.as_ref())?;
    config.validate().context("Invalid configuration")?;

    let args = match cli.command {
        Some(Command::Config { json }) => {
            utils::display_config(&config, json)?;
            return Ok(ExitStatus::Success);
        }
        Some(Command::Validate) => {
            utils::validate_config(&config)?;
            return Ok(ExitStatus::Success);
        }
        Some(Command::Run(args)) => args,
        None => RunArgs::default(),
    };

    let invocation = args
        .invocation()
        .context("Invalid run configuration")?;

    let mut options = SweepOptions::from(&config.sweeper);
    options.dry_run |= args.dry_run;

    let sweeper = Sweeper::new(config.sweeper, options);
    let mut reporter = TextReporter::stdout();
    let result = sweeper.run(&invocation, &mut reporter);

    Ok(result.exit_status())
}

/// Process exit codes are a single byte.
fn exit_code(status: ExitStatus) -> ExitCode {
    u8::try_from(status.code())
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["logsweep-run"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_args_build_invocation() {
        let cli = Cli::try_parse_from([
            "logsweep-run",
            "run",
            "--target-dir",
            "/var/log/jobs",
            "--max-age-days",
            "30",
        ])
        .unwrap();

        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        let invocation = args.invocation().unwrap();
        assert_eq!(invocation.max_age_days_override, Some(30));
        assert_eq!(
            invocation.target_directory,
            Some(PathBuf::from("/var/log/jobs"))
        );
    }

    #[test]
    fn test_conf_json_sets_override() {
        let cli = Cli::try_parse_from([
            "logsweep-run",
            "run",
            "--conf",
            r#"{"maxLogAgeInDays": "7"}"#,
        ])
        .unwrap();

        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.invocation().unwrap().max_age_days_override, Some(7));
    }

    #[test]
    fn test_conf_conflicts_with_max_age_days() {
        let parsed = Cli::try_parse_from([
            "logsweep-run",
            "run",
            "--max-age-days",
            "3",
            "--conf",
            "{}",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(ExitStatus::Success), ExitCode::SUCCESS);
        assert_eq!(exit_code(ExitStatus::Failure(13)), ExitCode::from(13));
        assert_eq!(exit_code(ExitStatus::Failure(300)), ExitCode::FAILURE);
    }
}
