mod cli_logger;

use anyhow::Result;
use clap::{Parser, Subcommand, error::ErrorKind};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cairo_prof::{
    Config, DEFAULT_CONFIG_FILE, ExitOutcome, ProfileArgs, SystemClock, SystemRunner,
    doctor_command, profile_command,
};

use crate::cli_logger::CliLogger;

/// Profile Cairo tests and executables into pprof profiles and call graphs.
#[derive(Debug, Parser)]
#[command(name = "cairo-prof", version)]
struct Cli {
    /// Config file (default: <workspace>/cairo-prof.toml, optional).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Scarb workspace the tools run in.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,
    /// Print machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,
    #[arg(long = "no-color", global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trace a test or executable, build its profile and render the graph.
    Profile(ProfileArgs),
    /// Check which external tools resolve on PATH.
    Doctor,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap exits 2 on usage errors, which would read as a runner failure.
            let outcome = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitOutcome::Success,
                _ => ExitOutcome::ArgumentError,
            };
            let _ = err.print();
            return outcome.into();
        }
    };

    let logger = CliLogger::new(cli.json, cli.no_color);
    match run(&cli, &logger) {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            logger.print_error(&format!("{err:#}"));
            ExitOutcome::ArgumentError.into()
        }
    }
}

fn run(cli: &Cli, logger: &CliLogger) -> Result<ExitOutcome> {
    let config = load_config(cli.config.as_deref(), &cli.workspace)?;
    let runner = SystemRunner;

    match &cli.command {
        Command::Profile(args) => {
            let report = profile_command(&config, &cli.workspace, args, &runner, &SystemClock);
            logger.print_run_report(&report)?;
            Ok(report.outcome)
        }
        Command::Doctor => {
            let report = doctor_command(&config, &runner);
            logger.print_doctor(&report)?;
            Ok(if report.ok {
                ExitOutcome::Success
            } else {
                ExitOutcome::ToolMissing
            })
        }
    }
}

fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<Config> {
    match explicit {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::load_optional(&workspace.join(DEFAULT_CONFIG_FILE))),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
