use anyhow::Result;
use crossbeam::channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounded worker pool for running independent work items
///
/// Results come back in input order regardless of completion order. Items
/// the `keep_going` gate refuses are never handed to the processor and come
/// back as `None`.
pub struct ParallelExecutor {
    max_workers: usize,
    buffer_size: usize,
}

/// Context for worker threads to avoid too many function parameters
struct WorkerContext<'a, T, R, F, G, P> {
    worker_id: usize,
    work_rx: Receiver<(usize, T)>,
    result_tx: Sender<(usize, Option<R>)>,
    progress_counter: &'a AtomicUsize,
    total_items: usize,
    processor: &'a F,
    keep_going: &'a G,
    progress_reporter: Option<&'a P>,
}

impl ParallelExecutor {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self { max_workers, buffer_size: max_workers * 2 }
    }

    /// Execute work items with at most `max_workers` running at once
    pub fn execute<T, R, F, G, P>(
        &self,
        work_items: Vec<T>,
        processor: F,
        keep_going: G,
        progress_reporter: Option<P>,
    ) -> Result<Vec<Option<R>>>
    where
        T: Send,
        R: Send,
        F: Fn(&T, usize) -> R + Sync, // (item, worker_id)
        G: Fn() -> bool + Sync,
        P: Fn(usize, usize, usize) + Sync, // (current, total, worker_id)
    {
        if work_items.is_empty() {
            return Ok(Vec::new());
        }

        let total_items = work_items.len();
        let actual_workers = std::cmp::min(self.max_workers, total_items);
        let (work_tx, work_rx) = bounded::<(usize, T)>(self.buffer_size);
        let (result_tx, result_rx) = bounded::<(usize, Option<R>)>(self.buffer_size);
        let progress_counter = AtomicUsize::new(0);

        crossbeam::thread::scope(|s| {
            for worker_id in 0..actual_workers {
                let ctx = WorkerContext {
                    worker_id,
                    work_rx: work_rx.clone(),
                    result_tx: result_tx.clone(),
                    progress_counter: &progress_counter,
                    total_items,
                    processor: &processor,
                    keep_going: &keep_going,
                    progress_reporter: progress_reporter.as_ref(),
                };
                s.spawn(move |_| worker_thread(ctx));
            }

            // Producer thread: send work to workers
            s.spawn(move |_| {
                for item in work_items.into_iter().enumerate() {
                    if work_tx.send(item).is_err() {
                        break; // Workers dropped
                    }
                }
            });

            // Drop senders so receivers know when work is done
            drop(work_rx);
            drop(result_tx);

            collect_results(result_rx, total_items)
        })
        .map_err(|_| anyhow::anyhow!("Thread panic occurred during parallel execution"))
    }
}

fn worker_thread<T, R, F, G, P>(ctx: WorkerContext<'_, T, R, F, G, P>)
where
    F: Fn(&T, usize) -> R,
    G: Fn() -> bool,
    P: Fn(usize, usize, usize),
{
    while let Ok((index, work_item)) = ctx.work_rx.recv() {
        let result = if (ctx.keep_going)() { Some((ctx.processor)(&work_item, ctx.worker_id)) } else { None };

        if ctx.result_tx.send((index, result)).is_err() {
            break; // Receiver dropped
        }

        let current = ctx.progress_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(reporter) = ctx.progress_reporter {
            reporter(current, ctx.total_items, ctx.worker_id);
        }
    }
}

fn collect_results<R>(result_rx: Receiver<(usize, Option<R>)>, total_items: usize) -> Vec<Option<R>> {
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total_items).collect();
    while let Ok((index, result)) = result_rx.recv() {
        slots[index] = result;
    }
    slots
}

/// Sequential execution strategy, used when only one worker is allowed
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn execute<T, R, F, G, P>(
        work_items: Vec<T>,
        processor: F,
        keep_going: G,
        progress_reporter: Option<P>,
    ) -> Vec<Option<R>>
    where
        F: Fn(&T, usize) -> R,
        G: Fn() -> bool,
        P: Fn(usize, usize, usize),
    {
        let total_items = work_items.len();
        let mut results = Vec::with_capacity(total_items);

        for (index, work_item) in work_items.iter().enumerate() {
            results.push(if keep_going() { Some(processor(work_item, 0)) } else { None });

            if let Some(reporter) = &progress_reporter {
                reporter(index + 1, total_items, 0);
            }
        }

        results
    }
}

/// Execution strategy enum for choosing between parallel and sequential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel { workers: usize },
}

impl ExecutionStrategy {
    pub fn execute<T, R, F, G, P>(
        &self,
        work_items: Vec<T>,
        processor: F,
        keep_going: G,
        progress_reporter: Option<P>,
    ) -> Result<Vec<Option<R>>>
    where
        T: Send,
        R: Send,
        F: Fn(&T, usize) -> R + Sync,
        G: Fn() -> bool + Sync,
        P: Fn(usize, usize, usize) + Sync,
    {
        match self {
            ExecutionStrategy::Sequential => {
                Ok(SequentialExecutor::execute(work_items, processor, keep_going, progress_reporter))
            }
            ExecutionStrategy::Parallel { workers } => {
                ParallelExecutor::new(*workers).execute(work_items, processor, keep_going, progress_reporter)
            }
        }
    }

    /// Pick a strategy for `task_count` items.
    ///
    /// `concurrency` of 0 means "derive from the machine" using
    /// `thread_percentage` of the available cores.
    pub fn for_workload(concurrency: usize, thread_percentage: u8, task_count: usize) -> Self {
        let workers = if concurrency == 0 {
            Self::calculate_optimal_workers(0, thread_percentage)
        } else {
            concurrency
        };
        match std::cmp::min(workers, task_count) {
            0 | 1 => ExecutionStrategy::Sequential,
            workers => ExecutionStrategy::Parallel { workers },
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Parallel { workers } => *workers,
        }
    }

    /// Calculate optimal workers based on available system resources and configuration limits
    ///
    /// # Algorithm
    /// ```text
    /// 1. Detect available CPU cores: num_cpus::get()
    /// 2. Apply percentage: cores * thread_percentage / 100
    /// 3. Apply config limit: min(max_threads_config, percentage_result) if max_threads_config > 0
    /// 4. Ensure minimum: max(1, final_result)
    /// ```
    ///
    /// # Examples
    /// ```rust
    /// use mirrorsync::parallel::ExecutionStrategy;
    ///
    /// let workers = ExecutionStrategy::calculate_optimal_workers(0, 75);
    /// assert!(workers >= 1);
    ///
    /// let workers = ExecutionStrategy::calculate_optimal_workers(8, 75);
    /// assert!(workers <= 8);
    /// ```
    pub fn calculate_optimal_workers(max_threads_config: usize, thread_percentage: u8) -> usize {
        let available_cores = num_cpus::get();

        let workers_by_percentage = std::cmp::max(1, (available_cores * thread_percentage as usize) / 100);

        // 0 means use percentage calculation only
        if max_threads_config > 0 {
            std::cmp::min(max_threads_config, workers_by_percentage)
        } else {
            workers_by_percentage
        }
    }
}
