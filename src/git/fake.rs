//! Scripted transport for engine and orchestrator tests

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use super::{CommandOutput, GitCommand, Operation, Transport};
use crate::error::SyncError;
use crate::shared::CancelToken;

type Response = Result<CommandOutput, SyncError>;

/// Replays queued responses per operation, falling back to a per-operation
/// default and finally to empty success. A successful clone materializes a
/// minimal repository layout at the destination so the engine's filesystem
/// probe recognizes it on the next run.
#[derive(Default)]
pub(crate) struct FakeTransport {
    queued: Mutex<HashMap<Operation, VecDeque<Response>>>,
    defaults: Mutex<HashMap<Operation, Response>>,
    calls: Mutex<Vec<GitCommand>>,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long (cancellably) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue(&self, operation: Operation, response: Response) -> &Self {
        self.queued.lock().unwrap().entry(operation).or_default().push_back(response);
        self
    }

    pub fn set_default(&self, operation: Operation, response: Response) -> &Self {
        self.defaults.lock().unwrap().insert(operation, response);
        self
    }

    pub fn calls(&self) -> Vec<GitCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.operation == operation).count()
    }

    fn next_response(&self, operation: Operation) -> Response {
        if let Some(response) = self.queued.lock().unwrap().get_mut(&operation).and_then(VecDeque::pop_front) {
            return response;
        }
        self.defaults
            .lock()
            .unwrap()
            .get(&operation)
            .cloned()
            .unwrap_or_else(|| Ok(CommandOutput::default()))
    }
}

pub(crate) fn ok(stdout: &str) -> Response {
    Ok(CommandOutput { exit_code: 0, stdout: stdout.to_string(), stderr: String::new() })
}

pub(crate) fn fail(operation: Operation, stderr: &str) -> Response {
    Err(SyncError::Transport {
        operation,
        code: Some(128),
        stderr: stderr.to_string(),
        class: super::classify(Some(128), stderr),
    })
}

fn materialize_clone(command: &GitCommand) {
    let Some(dest) = command.args.last().map(PathBuf::from) else { return };
    let bare = command.args.iter().any(|arg| arg == "--mirror");
    let git_dir = if bare { dest.clone() } else { dest.join(".git") };
    std::fs::create_dir_all(git_dir.join("objects")).unwrap();
    std::fs::create_dir_all(git_dir.join("refs")).unwrap();
    std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
}

impl Transport for FakeTransport {
    fn execute(&self, command: &GitCommand, _timeout: Duration, cancel: &CancelToken) -> Response {
        self.calls.lock().unwrap().push(command.clone());
        if let Some(delay) = self.delay {
            if !cancel.sleep(delay) {
                return Err(SyncError::Cancelled);
            }
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let response = self.next_response(command.operation);
        if response.is_ok() && command.operation == Operation::Clone {
            materialize_clone(command);
        }
        response
    }
}
