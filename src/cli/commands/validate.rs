use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use super::run::{self, RunArgs};
use crate::cli::{EXIT_CONFIG, EXIT_SUCCESS, Output};
use crate::git::GitTransport;

#[derive(Args, Clone, Debug, Default)]
pub struct ValidateArgs {
    /// Print the effective configuration as TOML
    #[arg(long)]
    pub print_config: bool,
}

pub async fn execute(args: ValidateArgs, config_path: Option<&Path>, output: &Output) -> Result<i32> {
    let (config, tasks) = run::resolve(&RunArgs::default(), config_path).await?;

    if args.print_config {
        let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{rendered}");
    }

    let transport = GitTransport::locate(&config.git.binary)?;
    let version = transport.version()?;
    output.success(&format!("{} ({})", version, transport.binary().display()));

    let mut invalid = 0;
    for task in &tasks {
        match task.validate() {
            Ok(()) => output.success(&format!(
                "{}: {} -> {} [{}]",
                task.name,
                task.source.display(),
                task.target.path().display(),
                task.options.mode
            )),
            Err(error) => {
                invalid += 1;
                output.error(&format!("{}: {}", task.name, error));
            }
        }
    }

    if invalid > 0 {
        output.error(&format!("{invalid} of {} repositories are misconfigured", tasks.len()));
        return Ok(EXIT_CONFIG);
    }
    output.success(&format!("Configuration valid, {} repositories", tasks.len()));
    Ok(EXIT_SUCCESS)
}
