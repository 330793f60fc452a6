use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::run::{self, RunArgs};
use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, Output};
use crate::git::GitTransport;
use crate::mirror::{MirrorEngine, RetryPolicy, TargetStatus};
use crate::shared::CancelToken;

#[derive(Args, Clone, Debug, Default)]
pub struct StatusArgs {
    /// Only show the named repositories (repeatable)
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Print statuses as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusLine {
    name: String,
    target: PathBuf,
    #[serde(flatten)]
    status: TargetStatus,
}

/// Inspect every target on disk; never touches the network.
pub async fn execute(args: StatusArgs, config_path: Option<&Path>, output: &Output) -> Result<i32> {
    let run_args = RunArgs { only: args.only.clone(), ..RunArgs::default() };
    let (config, tasks) = run::resolve(&run_args, config_path).await?;

    let transport = GitTransport::locate(&config.git.binary)?;
    let engine = MirrorEngine::new(transport, RetryPolicy::none());
    let cancel = CancelToken::new();

    let mut lines = Vec::with_capacity(tasks.len());
    let mut code = EXIT_SUCCESS;
    for task in &tasks {
        match engine.inspect(task, &cancel) {
            Ok(status) => {
                if matches!(status, TargetStatus::Mismatch { .. } | TargetStatus::Foreign { .. }) {
                    code = EXIT_FAILURE;
                }
                if !args.json {
                    output.target_status(&task.name, &status);
                }
                lines.push(StatusLine { name: task.name.clone(), target: task.target.path().to_path_buf(), status });
            }
            Err(error) => {
                code = EXIT_FAILURE;
                output.error(&format!("{}: {}", task.name, error));
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&lines).context("Failed to serialize status")?);
    }
    Ok(code)
}
