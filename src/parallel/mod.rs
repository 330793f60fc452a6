//! Bounded parallel execution for independent work items
//!
//! The parallel module only knows about worker counts and scheduling. What a
//! work item means, and when to stop dispatching new ones, is decided by the
//! caller:
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Client        │    │   Parallel       │    │   System        │
//! │   (Orchestrator)│───▶│   Module         │───▶│   Resources     │
//! │                 │    │                  │    │                 │
//! │ • Sync tasks    │    │ • CPU cores      │    │ • Hardware      │
//! │ • Fail-fast     │    │ • Worker pool    │    │ • OS limits     │
//! │ • Cancellation  │    │ • Result order   │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use mirrorsync::parallel::ExecutionStrategy;
//!
//! // At most 4 workers, never more than there are items
//! let strategy = ExecutionStrategy::for_workload(4, 75, 3);
//! assert_eq!(strategy, ExecutionStrategy::Parallel { workers: 3 });
//!
//! let doubled = strategy
//!     .execute(vec![1, 2, 3], |x, _worker| x * 2, || true, None::<fn(usize, usize, usize)>)
//!     .unwrap();
//! assert_eq!(doubled, vec![Some(2), Some(4), Some(6)]);
//! ```

pub mod core;

pub use self::core::{ExecutionStrategy, ParallelExecutor, SequentialExecutor};
