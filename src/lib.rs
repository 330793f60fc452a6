//! # mirrorsync - idempotent git mirroring
//!
//! mirrorsync keeps local mirrors of remote git repositories up to date. It
//! is built to run unattended in a disposable container: every run clones
//! what is missing, fetches what exists, reports what changed and never
//! overwrites a target that belongs to a different source.
//!
//! ## Architecture
//!
//! ```text
//! cli ──▶ sync::Orchestrator ──▶ parallel (worker pool)
//!                                   │
//!                                   ▼
//!                        mirror::MirrorEngine ──▶ git::Transport ──▶ git
//! ```
//!
//! - [`git`]: runs the `git` binary with timeouts, cancellation and failure
//!   classification
//! - [`mirror`]: the per-repository state machine and retry policy
//! - [`sync`]: runs many tasks, applies the failure policy, builds the report
//! - [`config`]: layered configuration (defaults, files, env, flags)
//! - [`discovery`]: expands GitLab groups into repository entries
//!
//! ## Quick Start
//!
//! ```bash
//! # Mirror one repository into ./mirrors
//! mirrorsync run --source https://gitlab.example.com/dso/app1.git
//!
//! # Or list repositories in mirrorsync.toml and sync them every 10 minutes
//! mirrorsync run --interval 600
//! ```

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod mirror;
pub mod parallel;
pub mod shared;
pub mod sync;

pub use cli::{Cli, Output};
pub use config::MirrorConfig;
pub use error::{ErrorKind, SyncError};

/// Result type alias for mirrorsync plumbing
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
