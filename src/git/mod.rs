//! Git transport layer
//!
//! Runs the system `git` binary as a subprocess with captured output, a
//! per-operation timeout and run-level cancellation. Nothing here retries;
//! failures are classified and handed back to the mirror engine.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::SyncError;
use crate::shared::CancelToken;
use crate::shared::location::redact;

pub mod classify;
pub mod command;
pub mod refs;

#[cfg(test)]
pub(crate) mod fake;

pub use classify::{FailureClass, classify};
pub use command::{Credential, GitCommand, Operation};
pub use refs::RefTips;

/// How often a running child is polled for exit, timeout and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a successful git invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Executes git commands; the seam the engine is tested through.
pub trait Transport: Send + Sync {
    fn execute(&self, command: &GitCommand, timeout: Duration, cancel: &CancelToken)
    -> Result<CommandOutput, SyncError>;
}

/// Transport backed by the system git binary
#[derive(Debug, Clone)]
pub struct GitTransport {
    binary: PathBuf,
}

impl GitTransport {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Resolve `binary` on PATH, failing with an environment error when absent.
    pub fn locate(binary: &str) -> Result<Self, SyncError> {
        let resolved = which::which(binary)
            .map_err(|e| SyncError::Environment(format!("'{binary}' not found on PATH: {e}")))?;
        tracing::debug!("Using git binary at {}", resolved.display());
        Ok(Self::new(resolved))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// `git --version`, used as the pre-flight environment check.
    pub fn version(&self) -> Result<String, SyncError> {
        let output = self
            .execute(&GitCommand::version(), Duration::from_secs(10), &CancelToken::new())
            .map_err(|e| SyncError::Environment(format!("git is not runnable: {e}")))?;
        Ok(output.stdout.trim().to_string())
    }

    fn spawn(&self, command: &GitCommand) -> Result<Child, SyncError> {
        let mut process = Command::new(&self.binary);
        process
            .args(command.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");

        if let Some(work_tree) = &command.work_tree {
            process.current_dir(work_tree);
        }

        if std::env::var_os("GIT_SSH_COMMAND").is_none() {
            process.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
        }

        if let Some(credential) = &command.credential {
            process
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", credential.header());
        }

        process.spawn().map_err(|e| {
            SyncError::Environment(format!("failed to spawn {}: {e}", self.binary.display()))
        })
    }
}

impl Transport for GitTransport {
    fn execute(
        &self,
        command: &GitCommand,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, SyncError> {
        tracing::debug!("Running {}", command.display());
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut child = self.spawn(command)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let deadline = Instant::now() + timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    return Err(SyncError::Environment(format!("failed to wait for git: {e}")));
                }
            }
            if cancel.is_cancelled() {
                terminate(&mut child);
                return Err(SyncError::Cancelled);
            }
            if Instant::now() >= deadline {
                terminate(&mut child);
                tracing::warn!("{} exceeded {}s, killed", command.display(), timeout.as_secs());
                return Err(SyncError::Timeout { operation: command.operation, after: timeout });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let secrets = command.secrets();
        let stdout = redact(&collect(stdout), &secrets);
        let stderr = redact(&collect(stderr), &secrets);
        tracing::trace!(
            "git {} exited with {:?} ({} bytes stdout, {} bytes stderr)",
            command.operation,
            status.code(),
            stdout.len(),
            stderr.len()
        );

        match status.code() {
            Some(0) => Ok(CommandOutput { exit_code: 0, stdout, stderr }),
            code => Err(SyncError::Transport {
                operation: command.operation,
                code,
                class: classify(code, &stderr),
                stderr,
            }),
        }
    }
}

/// Read a child pipe to completion on a helper thread so a chatty process
/// can never block on a full pipe while we poll it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    #[test]
    fn test_locate_missing_binary_is_environment_error() {
        let error = GitTransport::locate("definitely-not-a-git-binary-xyz").unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Environment);
    }

    #[test]
    fn test_spawn_failure_is_environment_error() {
        let transport = GitTransport::new("/nonexistent/bin/git");
        let error = transport
            .execute(&GitCommand::version(), Duration::from_secs(5), &CancelToken::new())
            .unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Environment);
    }

    #[test]
    fn test_version() {
        if !git_available() {
            return;
        }
        let transport = GitTransport::locate("git").unwrap();
        assert!(transport.version().unwrap().starts_with("git version"));
    }

    #[test]
    fn test_nonzero_exit_is_classified() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let transport = GitTransport::locate("git").unwrap();
        let error = transport
            .execute(
                &GitCommand::list_refs(&dir.path().join("missing.git")),
                Duration::from_secs(10),
                &CancelToken::new(),
            )
            .unwrap_err();
        match error {
            SyncError::Transport { operation, code, class, .. } => {
                assert_eq!(operation, Operation::ListRefs);
                assert_ne!(code, Some(0));
                assert_eq!(class, FailureClass::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Stand-in git binary that hangs until killed
    #[cfg(unix)]
    fn hanging_git(dir: &Path) -> GitTransport {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("git");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        GitTransport::new(script)
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let transport = hanging_git(dir.path());

        let started = Instant::now();
        let error = transport
            .execute(&GitCommand::version(), Duration::from_millis(300), &CancelToken::new())
            .unwrap_err();
        match error {
            SyncError::Timeout { operation, after } => {
                assert_eq!(operation, Operation::Version);
                assert_eq!(after, Duration::from_millis(300));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let transport = hanging_git(dir.path());
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            remote.cancel();
        });

        let started = Instant::now();
        let error = transport
            .execute(&GitCommand::version(), Duration::from_secs(60), &cancel)
            .unwrap_err();
        assert!(matches!(error, SyncError::Cancelled), "{error:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }

    #[test]
    fn test_cancelled_before_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let transport = GitTransport::new("git");
        let error = transport
            .execute(&GitCommand::version(), Duration::from_secs(5), &cancel)
            .unwrap_err();
        assert!(matches!(error, SyncError::Cancelled));
    }
}
