//! Worker sinks: where ready task nodes are sent to execute.
//!
//! The scheduling core only depends on [`WorkerSink`]: a sink accepts a
//! node whose dependencies are satisfied and eventually runs it. Sibling
//! submissions carry no ordering guarantee beyond the graph's own edges.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error, info, warn};

use crate::config::ThreadingConfig;
use crate::error::SinkError;
use crate::task::TaskRef;

/// Admission contract of a worker pool.
pub trait WorkerSink: Send + Sync {
    /// Apply concurrency parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the pool cannot be (re)built.
    fn configure(&self, config: &ThreadingConfig) -> Result<(), SinkError>;

    /// Accept a ready node for eventual execution. Returns without waiting
    /// for the node to run.
    fn submit(&self, task: TaskRef);
}

/// Run a submitted node, logging precondition violations.
fn run_logged(task: &TaskRef, sink: &dyn WorkerSink) {
    if let Err(err) = task.run(sink) {
        warn!(task = %task.label(), error = %err, "Rejected task submission");
    }
}

// ---------------------------------------------------------------------------
// Inline
// ---------------------------------------------------------------------------

/// Runs every submitted node immediately on the submitting thread.
///
/// Successors released by a node run before `submit` returns, so a whole
/// graph executes depth-first inside the first call. Meant for tests and
/// tools; a self-resubmitting chain never returns on this sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSink;

impl WorkerSink for InlineSink {
    fn configure(&self, _config: &ThreadingConfig) -> Result<(), SinkError> {
        Ok(())
    }

    fn submit(&self, task: TaskRef) {
        run_logged(&task, self);
    }
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

/// Queues submitted nodes until the owner drains them.
///
/// Lets a caller step a graph one node at a time on its own thread, which
/// makes scheduling order fully deterministic.
#[derive(Debug, Default)]
pub struct ManualSink {
    queue: Mutex<VecDeque<TaskRef>>,
}

impl ManualSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued nodes.
    pub fn len(&self) -> usize {
        self.lock_queue().len()
    }

    /// Whether no nodes are queued.
    pub fn is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    /// Run the oldest queued node. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        // Popped under the lock, run without it: the node may submit.
        let next = self.lock_queue().pop_front();
        match next {
            Some(task) => {
                run_logged(&task, self);
                true
            }
            None => false,
        }
    }

    /// Run queued nodes until the queue is empty or `limit` nodes have run.
    /// Returns the number of nodes run.
    pub fn run_until_idle(&self, limit: usize) -> usize {
        let mut ran = 0_usize;
        while ran < limit && self.run_next() {
            ran = ran.saturating_add(1);
        }
        ran
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<TaskRef>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkerSink for ManualSink {
    fn configure(&self, _config: &ThreadingConfig) -> Result<(), SinkError> {
        Ok(())
    }

    fn submit(&self, task: TaskRef) {
        self.lock_queue().push_back(task);
    }
}

// ---------------------------------------------------------------------------
// Rayon
// ---------------------------------------------------------------------------

/// A worker sink backed by a [`rayon::ThreadPool`].
///
/// Cloning is cheap; clones share the same pool. [`configure`] swaps in a
/// freshly built pool when the parameters change; nodes already spawned
/// finish on the old one.
///
/// [`configure`]: WorkerSink::configure
#[derive(Debug, Clone)]
pub struct RayonSink {
    current: Arc<RwLock<PoolState>>,
}

/// The live pool and the parameters it was built from.
#[derive(Debug)]
struct PoolState {
    config: ThreadingConfig,
    pool: Arc<rayon::ThreadPool>,
}

impl RayonSink {
    /// Build a sink with a pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::PoolBuild`] if rayon cannot spawn the pool.
    pub fn new(config: &ThreadingConfig) -> Result<Self, SinkError> {
        let pool = build_pool(config)?;
        Ok(Self {
            current: Arc::new(RwLock::new(PoolState {
                config: config.clone(),
                pool: Arc::new(pool),
            })),
        })
    }

    /// Number of worker threads in the current pool.
    pub fn current_num_threads(&self) -> usize {
        self.current_pool().current_num_threads()
    }

    fn current_pool(&self) -> Arc<rayon::ThreadPool> {
        let state = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.pool)
    }
}

fn build_pool(config: &ThreadingConfig) -> Result<rayon::ThreadPool, SinkError> {
    let threads = config.resolved_worker_threads();
    let prefix = config.thread_name.clone();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |index| format!("{prefix}-{index}"))
        .panic_handler(|_payload| error!("Worker thread panicked outside a task body"))
        .build()?;
    info!(threads, thread_name = %config.thread_name, "Worker pool built");
    Ok(pool)
}

impl WorkerSink for RayonSink {
    fn configure(&self, config: &ThreadingConfig) -> Result<(), SinkError> {
        let mut state = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if state.config == *config {
            debug!("Worker pool parameters unchanged");
            return Ok(());
        }
        state.pool = Arc::new(build_pool(config)?);
        state.config = config.clone();
        debug!("Worker pool replaced");
        Ok(())
    }

    fn submit(&self, task: TaskRef) {
        let sink = self.clone();
        self.current_pool().spawn(move || run_logged(&task, &sink));
    }
}
