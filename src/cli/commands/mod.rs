use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use super::{EXIT_SUCCESS, Output};

pub mod run;
pub mod status;
pub mod validate;
pub mod version;

#[derive(Parser)]
#[command(
    name = "mirrorsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mirror git repositories into local targets, idempotently",
    long_about = "mirrorsync clones or updates bare mirrors (or working copies) of the configured \
                  source repositories, retrying transient network failures and never touching a \
                  target that belongs to a different source."
)]
pub struct Cli {
    /// Run as if started in <DIR> instead of current working directory
    #[arg(short = 'C', long = "directory", global = true)]
    pub directory: Option<PathBuf>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the configured repositories
    Run(run::RunArgs),
    /// Check configuration and git availability, print the plan
    Validate(validate::ValidateArgs),
    /// Show the state of each target on disk
    Status(status::StatusArgs),
    /// Show version information
    Version(version::VersionArgs),
}

impl Cli {
    /// Execute the selected command and return the process exit code
    pub async fn run(self) -> Result<i32> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir).with_context(|| format!("cannot change directory to {}", dir.display()))?;
        }

        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.verbose > 0, self.quiet);
        let config = self.config.as_deref();

        match self.command {
            Some(Commands::Run(args)) => run::execute(args, config, &output).await,
            Some(Commands::Validate(args)) => validate::execute(args, config, &output).await,
            Some(Commands::Status(args)) => status::execute(args, config, &output).await,
            Some(Commands::Version(args)) => version::execute(args).await,
            None => {
                Cli::command().print_help()?;
                Ok(EXIT_SUCCESS)
            }
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => tracing_subscriber::EnvFilter::new("warn"),
        1 => tracing_subscriber::EnvFilter::new("info"),
        2 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    });

    // try_init: tests may run several commands in one process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
