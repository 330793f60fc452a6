//! Console output for mirrorsync
//!
//! User-facing lines go through [`Output`]; diagnostics go through
//! `tracing`. Styling follows the terminal (console disables colors when
//! stdout is not a tty).

use console::style;

use crate::mirror::{SyncOutcome, TargetStatus, TaskReport};
use crate::sync::{RunReport, RunStatus};

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Errors are always shown, even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✖").red(), message);
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    pub fn header(&self, title: &str) {
        if !self.quiet {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    pub fn table_row(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {:<14} {}", style(key).dim(), value);
        }
    }

    /// One line per task, failures on stderr so they survive `-q`
    pub fn task_report(&self, report: &TaskReport) {
        let name = style(&report.name).bold();
        match &report.outcome {
            SyncOutcome::Failed(failure) => {
                eprintln!("{} {} {}", style("✖").red().bold(), name, style(failure).red());
            }
            outcome => {
                if self.quiet {
                    return;
                }
                let icon = match outcome {
                    SyncOutcome::UpToDate => style("=").dim(),
                    _ => style("✔").green().bold(),
                };
                let mut line = format!("{icon} {name} {}", style(outcome.label()).green());
                if report.changed_refs > 0 {
                    line.push_str(&format!(" {}", style(format!("({} refs)", report.changed_refs)).dim()));
                }
                if self.verbose {
                    line.push_str(&format!(
                        " {}",
                        style(format!("{}ms, {} retries", report.elapsed_ms, report.retries)).dim()
                    ));
                }
                println!("{line}");
            }
        }
    }

    /// Per-task lines followed by the summary line
    pub fn run_report(&self, report: &RunReport) {
        for task in &report.tasks {
            self.task_report(task);
        }
        let summary = report.summary.to_string();
        match report.status {
            RunStatus::Succeeded if !self.quiet => {
                println!("{} {}", style("Sync succeeded:").green().bold(), summary);
            }
            RunStatus::Succeeded => {}
            RunStatus::Failed => eprintln!("{} {}", style("Sync failed:").red().bold(), summary),
            RunStatus::Cancelled => eprintln!("{} {}", style("Sync cancelled:").yellow().bold(), summary),
        }
    }

    pub fn target_status(&self, name: &str, status: &TargetStatus) {
        if self.quiet {
            return;
        }
        let name = style(name).bold();
        match status {
            TargetStatus::Absent => println!("{} {} {}", style("○").dim(), name, style("not cloned yet").dim()),
            TargetStatus::Mirrors { origin, refs } => {
                println!("{} {} {} {}", style("✔").green(), name, origin, style(format!("({refs} refs)")).dim())
            }
            TargetStatus::Mismatch { origin } => {
                println!("{} {} {} {}", style("✖").red(), name, style("occupied by").red(), origin)
            }
            TargetStatus::Foreign { found } => {
                println!("{} {} {} {}", style("✖").red(), name, style("target holds").red(), found)
            }
        }
    }
}
