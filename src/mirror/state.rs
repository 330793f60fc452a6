use std::fmt;

/// Lifecycle of one task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    Probing,
    Cloning,
    Fetching,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (NotStarted, Probing) => true,
            (Probing, Cloning | Fetching) => true,
            (Cloning | Fetching, Succeeded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::NotStarted => "not-started",
            TaskState::Probing => "probing",
            TaskState::Cloning => "cloning",
            TaskState::Fetching => "fetching",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Tracks a task's state and refuses illegal transitions.
#[derive(Debug)]
pub struct StateTracker<'a> {
    task: &'a str,
    state: TaskState,
}

impl<'a> StateTracker<'a> {
    pub fn new(task: &'a str) -> Self {
        Self { task, state: TaskState::NotStarted }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Returns `false` (and keeps the current state) for an illegal transition.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::error!("{}: illegal state transition {} -> {}", self.task, self.state, next);
            debug_assert!(false, "illegal state transition {} -> {}", self.state, next);
            return false;
        }
        tracing::debug!("{}: {} -> {}", self.task, self.state, next);
        self.state = next;
        true
    }
}
