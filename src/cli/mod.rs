//! Command-line interface for mirrorsync
//!
//! Parses arguments with clap, sets up logging, loads configuration and
//! hands resolved tasks to the orchestrator. Errors bubble up as
//! `anyhow::Error`; [`exit_code_for`] maps them onto process exit codes.

use crate::error::{ErrorKind, SyncError};

pub mod commands;
pub mod output;

pub use commands::Cli;
pub use output::Output;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_ENVIRONMENT: i32 = 3;
pub const EXIT_CANCELLED: i32 = 130;

/// Exit code for an error that aborted a command before or instead of a run
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    let kind = error.chain().find_map(|cause| cause.downcast_ref::<SyncError>()).map(SyncError::kind);
    match kind {
        Some(ErrorKind::Configuration) => EXIT_CONFIG,
        Some(ErrorKind::Environment) => EXIT_ENVIRONMENT,
        Some(ErrorKind::Cancelled) => EXIT_CANCELLED,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_follow_error_kind() {
        let config: anyhow::Error = SyncError::Configuration("bad".into()).into();
        assert_eq!(exit_code_for(&config), EXIT_CONFIG);

        let wrapped = Err::<(), _>(SyncError::Environment("no git".into()))
            .context("while locating git")
            .unwrap_err();
        assert_eq!(exit_code_for(&wrapped), EXIT_ENVIRONMENT);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_FAILURE);
    }
}
