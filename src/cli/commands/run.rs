use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{EXIT_SUCCESS, Output};
use crate::config::{ConfigOverrides, MirrorConfig, RepoConfig, RepoFilter, RetryOverrides, SyncOverrides};
use crate::discovery;
use crate::git::GitTransport;
use crate::mirror::{MirrorEngine, SyncMode, SyncTask};
use crate::shared::CancelToken;
use crate::sync::{self, Orchestrator, RunReport};

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Extra source repository to sync (repeatable)
    #[arg(long = "source", value_name = "URL")]
    pub sources: Vec<String>,

    /// Only sync the named repositories (repeatable)
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Skip the named repositories (repeatable)
    #[arg(long, value_name = "NAME")]
    pub skip: Vec<String>,

    /// Directory mirrors are created under
    #[arg(long, value_name = "DIR")]
    pub target_root: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub mode: Option<SyncMode>,

    /// Repositories synced at once (0 = based on CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Timeout per git operation
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries per git operation after a transient failure
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Stop starting new repositories after the first failure
    #[arg(long, conflicts_with = "max_failures")]
    pub fail_fast: bool,

    /// Failed repositories tolerated before the run counts as failed
    #[arg(long, value_name = "N")]
    pub max_failures: Option<usize>,

    /// Repeat the run every SECS seconds until interrupted
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Cancel everything still running after SECS seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub deadline: Option<u64>,

    /// Print the plan without touching any target
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sync: SyncOverrides {
                target_root: self.target_root.clone(),
                mode: self.mode,
                concurrency: self.concurrency,
                timeout_secs: self.timeout,
                fail_fast: self.fail_fast.then_some(true),
                max_failures: self.max_failures,
            },
            retry: RetryOverrides { max_attempts: self.retries.map(|retries| retries.saturating_add(1)) },
        }
    }

    fn filter(&self) -> RepoFilter {
        RepoFilter { only: self.only.clone(), skip: self.skip.clone() }
    }
}

/// Load configuration and CLI sources, expand groups, then resolve the task list.
pub(crate) async fn resolve(args: &RunArgs, config_path: Option<&Path>) -> Result<(MirrorConfig, Vec<SyncTask>)> {
    let mut config = MirrorConfig::load(config_path, Some(args.overrides()))?;
    config.repos.extend(args.sources.iter().map(RepoConfig::from_source));
    config.validate()?;

    if !config.groups.is_empty() {
        let discovered = discovery::expand_groups(&config.groups).await?;
        config.repos.extend(discovered);
        config.validate()?;
    }

    let tasks = config.tasks(&args.filter())?;
    sync::validate_task_set(&tasks)?;
    Ok((config, tasks))
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, output: &Output) -> Result<i32> {
    let (config, tasks) = resolve(&args, config_path).await?;

    if tasks.is_empty() {
        output.warning("No repositories configured; add [[repos]] or [[groups]] entries, or pass --source");
    }

    if args.dry_run {
        print_plan(&tasks, output);
        return Ok(EXIT_SUCCESS);
    }

    let transport = GitTransport::locate(&config.git.binary)?;
    let git_version = transport.version()?;
    tracing::info!("Using {git_version}");

    let engine = MirrorEngine::new(transport, config.retry_policy());
    let orchestrator = Arc::new(Orchestrator::new(engine, config.run_options()));
    let tasks = Arc::new(tasks);
    let cancel = CancelToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    if let Some(secs) = args.deadline {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!("Deadline of {secs}s reached");
            cancel.cancel();
        });
    }

    loop {
        let report = run_once(orchestrator.clone(), tasks.clone(), cancel.clone()).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize run report")?);
        } else {
            output.run_report(&report);
        }

        let Some(interval) = args.interval else {
            return Ok(report.exit_code());
        };
        if cancel.is_cancelled() {
            return Ok(report.exit_code());
        }

        output.info(&format!("Next run in {interval}s (Ctrl-C to stop)"));
        let waiter = cancel.clone();
        let waited = tokio::task::spawn_blocking(move || waiter.sleep(Duration::from_secs(interval)))
            .await
            .context("interval timer failed")?;
        if !waited {
            return Ok(report.exit_code());
        }
    }
}

/// Run the blocking orchestrator off the async runtime.
async fn run_once(
    orchestrator: Arc<Orchestrator<GitTransport>>,
    tasks: Arc<Vec<SyncTask>>,
    cancel: CancelToken,
) -> Result<RunReport> {
    let report = tokio::task::spawn_blocking(move || orchestrator.run(&tasks, &cancel))
        .await
        .context("sync run panicked")??;
    Ok(report)
}

fn print_plan(tasks: &[SyncTask], output: &Output) {
    output.header(&format!("Plan ({} repositories)", tasks.len()));
    for task in tasks {
        output.info(&task.name);
        output.table_row("source", &task.source.display());
        if let Some(reference) = task.source.reference() {
            output.table_row("ref", reference);
        }
        output.table_row("target", &task.target.path().display().to_string());
        output.table_row("mode", &task.options.mode.to_string());
        if let Some(push) = task.target.push() {
            output.table_row("push to", &crate::shared::location::redact(&push.url, &[]));
        }
        if let Err(error) = task.validate() {
            output.warning(&format!("{}: {}", task.name, error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_become_total_attempts() {
        let args = RunArgs { retries: Some(0), ..RunArgs::default() };
        assert_eq!(args.overrides().retry.max_attempts, Some(1));
        let args = RunArgs { retries: Some(4), fail_fast: true, ..RunArgs::default() };
        let overrides = args.overrides();
        assert_eq!(overrides.retry.max_attempts, Some(5));
        assert_eq!(overrides.sync.fail_fast, Some(true));
    }

    #[test]
    fn test_unset_flags_produce_no_overrides() {
        let overrides = RunArgs::default().overrides();
        assert_eq!(serde_json::to_value(&overrides).unwrap(), serde_json::json!({}));
    }
}
