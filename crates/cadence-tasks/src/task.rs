//! Dependency-counted task nodes.
//!
//! A node becomes eligible to run once its incoming counter reaches zero.
//! Running a node fires its begin hooks, executes its body, fires its done
//! hooks, and then decrements every successor's counter. The decrement is
//! an acquire-release read-modify-write, so the thread that releases a
//! successor observes every effect of every predecessor. Whichever
//! predecessor takes a successor's counter to zero submits it to the sink;
//! no other thread ever sees it reach zero, so each node runs exactly once.
//!
//! Edges must be added while the graph is being built. Connecting into a
//! node whose other predecessors may already be completing is a race the
//! caller must avoid; connecting to or from a node that has started is
//! rejected with [`TaskError::EdgeAfterStart`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, trace, warn};

use crate::error::{TaskError, TaskFailure};
use crate::group::GroupParts;
use crate::sink::WorkerSink;

/// Shared handle to a task node. A node with several predecessors is
/// referenced by each of them until it runs.
pub type TaskRef = Arc<TaskNode>;

/// Lifecycle callback attached to a node.
type Hook = Box<dyn FnOnce() + Send>;

/// The work a node performs.
type Work = Box<dyn FnOnce() -> Result<(), TaskFailure> + Send>;

/// What happens when a node runs.
pub(crate) enum Body {
    /// Execute a closure.
    Work(Work),
    /// Expand into a group of children plus a hook.
    Group(GroupParts),
    /// Do nothing besides hooks and successor release.
    Empty,
}

/// Mutable part of a node, guarded by the node's lock.
struct NodeState {
    /// Taken exactly once, when the node runs.
    body: Option<Body>,
    /// Successors, exclusively owned by this node until it completes.
    outgoing: Vec<TaskRef>,
    on_begin: Vec<Hook>,
    on_done: Vec<Hook>,
}

/// A unit of schedulable work with dependency edges and lifecycle hooks.
pub struct TaskNode {
    label: String,
    /// Predecessors that have not completed yet.
    incoming: AtomicUsize,
    started: AtomicBool,
    state: Mutex<NodeState>,
}

impl core::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskNode")
            .field("label", &self.label)
            .field("incoming", &self.incoming_count())
            .field("outgoing", &self.outgoing_count())
            .field("started", &self.has_started())
            .finish_non_exhaustive()
    }
}

impl TaskNode {
    pub(crate) fn with_body(label: impl Into<String>, body: Body) -> TaskRef {
        Arc::new(Self {
            label: label.into(),
            incoming: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            state: Mutex::new(NodeState {
                body: Some(body),
                outgoing: Vec::new(),
                on_begin: Vec::new(),
                on_done: Vec::new(),
            }),
        })
    }

    /// Create a node running an infallible closure.
    pub fn new<F>(label: impl Into<String>, work: F) -> TaskRef
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_body(
            label,
            Body::Work(Box::new(move || {
                work();
                Ok(())
            })),
        )
    }

    /// Create a node whose body may report a [`TaskFailure`].
    pub fn fallible<F>(label: impl Into<String>, work: F) -> TaskRef
    where
        F: FnOnce() -> Result<(), TaskFailure> + Send + 'static,
    {
        Self::with_body(label, Body::Work(Box::new(work)))
    }

    /// Create a node with no body. Useful as a join point or group hook.
    pub fn empty(label: impl Into<String>) -> TaskRef {
        Self::with_body(label, Body::Empty)
    }

    /// Diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of predecessors that have not completed yet.
    pub fn incoming_count(&self) -> usize {
        self.incoming.load(Ordering::Acquire)
    }

    /// Number of successors still attached to this node.
    pub fn outgoing_count(&self) -> usize {
        self.lock_state().outgoing.len()
    }

    /// Whether [`run`](Self::run) has been entered.
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Register `successor` as depending on this node.
    ///
    /// # Errors
    ///
    /// [`TaskError::SelfEdge`] if `successor` is this node, and
    /// [`TaskError::EdgeAfterStart`] if either node has started.
    pub fn connect(&self, successor: &TaskRef) -> Result<(), TaskError> {
        if core::ptr::eq(self, Arc::as_ptr(successor)) {
            return Err(TaskError::SelfEdge {
                label: self.label.clone(),
            });
        }

        // Checked under our lock: `run` flips `started` before taking it,
        // so an edge is either rejected here or seen by `complete`.
        let mut state = self.lock_state();
        if self.has_started() || successor.has_started() {
            return Err(TaskError::EdgeAfterStart {
                from: self.label.clone(),
                to: successor.label.clone(),
            });
        }
        successor.incoming.fetch_add(1, Ordering::AcqRel);
        state.outgoing.push(Arc::clone(successor));
        Ok(())
    }

    /// Append a hook fired right before the body runs.
    ///
    /// # Errors
    ///
    /// [`TaskError::AlreadyStarted`] if the node has started.
    pub fn on_begin<F>(&self, hook: F) -> Result<(), TaskError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock_unstarted()?;
        state.on_begin.push(Box::new(hook));
        Ok(())
    }

    /// Append a hook fired after the body completes, before successors are
    /// released. For a group this is after its trailing hook completes.
    ///
    /// # Errors
    ///
    /// [`TaskError::AlreadyStarted`] if the node has started.
    pub fn on_done<F>(&self, hook: F) -> Result<(), TaskError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock_unstarted()?;
        state.on_done.push(Box::new(hook));
        Ok(())
    }

    /// Execute the node and release its successors into `sink`.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotReady`] if predecessors are outstanding, and
    /// [`TaskError::AlreadyStarted`] on a second run. Neither error touches
    /// the node's state. A group whose children cannot be wired reports the
    /// wiring error after completing in place of its hook.
    pub fn run(self: &Arc<Self>, sink: &dyn WorkerSink) -> Result<(), TaskError> {
        let incoming = self.incoming_count();
        if incoming != 0 {
            return Err(TaskError::NotReady {
                label: self.label.clone(),
                incoming,
            });
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(TaskError::AlreadyStarted {
                label: self.label.clone(),
            });
        }

        let (body, begin_hooks) = {
            let mut state = self.lock_state();
            (state.body.take(), std::mem::take(&mut state.on_begin))
        };
        for hook in begin_hooks {
            hook();
        }

        match body {
            Some(Body::Group(parts)) => {
                trace!(task = %self.label, "Expanding task group");
                let expanded = parts.expand(self, sink);
                if expanded.is_err() {
                    // Successors are released even when expansion fails.
                    self.complete(sink);
                }
                return expanded;
            }
            Some(Body::Work(work)) => self.execute(work),
            Some(Body::Empty) | None => {}
        }

        self.complete(sink);
        Ok(())
    }

    /// Run the body, containing failures and panics.
    fn execute(&self, work: Work) {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(())) => trace!(task = %self.label, "Task completed"),
            Ok(Err(failure)) => {
                warn!(task = %self.label, error = %failure, "Task body failed");
            }
            Err(_payload) => error!(task = %self.label, "Task body panicked"),
        }
    }

    /// Fire done hooks, then release successors.
    fn complete(&self, sink: &dyn WorkerSink) {
        let (done_hooks, outgoing) = {
            let mut state = self.lock_state();
            (
                std::mem::take(&mut state.on_done),
                std::mem::take(&mut state.outgoing),
            )
        };
        for hook in done_hooks {
            hook();
        }
        for successor in outgoing {
            if successor.incoming.fetch_sub(1, Ordering::AcqRel) == 1 {
                sink.submit(successor);
            }
        }
    }

    /// Move this node's successors and done hooks onto `target`, which then
    /// completes on this node's behalf.
    pub(crate) fn hand_off_completion(&self, target: &Self) {
        let (done_hooks, outgoing) = {
            let mut state = self.lock_state();
            (
                std::mem::take(&mut state.on_done),
                std::mem::take(&mut state.outgoing),
            )
        };
        let mut target_state = target.lock_state();
        target_state.on_done.extend(done_hooks);
        target_state.outgoing.extend(outgoing);
    }

    /// Mutate the group parts of an unstarted group node.
    pub(crate) fn with_group_parts<R>(
        &self,
        apply: impl FnOnce(&mut GroupParts) -> Result<R, TaskError>,
    ) -> Result<R, TaskError> {
        let mut state = self.lock_unstarted()?;
        match state.body.as_mut() {
            Some(Body::Group(parts)) => apply(parts),
            _ => Err(TaskError::NotAGroup {
                label: self.label.clone(),
            }),
        }
    }

    fn lock_unstarted(&self) -> Result<MutexGuard<'_, NodeState>, TaskError> {
        let state = self.lock_state();
        if self.has_started() {
            return Err(TaskError::AlreadyStarted {
                label: self.label.clone(),
            });
        }
        Ok(state)
    }

    fn lock_state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sink::{InlineSink, ManualSink};

    #[test]
    fn simple_body_runs() {
        let value = Arc::new(AtomicUsize::new(10));
        let target = Arc::clone(&value);
        let node = TaskNode::new("simple", move || target.store(30, Ordering::SeqCst));

        node.run(&InlineSink).unwrap();
        assert_eq!(value.load(Ordering::SeqCst), 30);
    }

    #[test]
    fn connect_counts_edges() {
        let a = TaskNode::empty("a");
        let b = TaskNode::empty("b");
        let c = TaskNode::empty("c");

        a.connect(&c).unwrap();
        b.connect(&c).unwrap();

        assert_eq!(a.incoming_count(), 0);
        assert_eq!(b.incoming_count(), 0);
        assert_eq!(c.incoming_count(), 2);

        assert_eq!(a.outgoing_count(), 1);
        assert_eq!(b.outgoing_count(), 1);
        assert_eq!(c.outgoing_count(), 0);
    }

    #[test]
    fn join_waits_for_every_predecessor() {
        let sink = ManualSink::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let make = |name: &'static str| {
            let log = Arc::clone(&log);
            TaskNode::new(name, move || log.lock().unwrap().push(name))
        };
        let a = make("a");
        let b = make("b");
        let c = make("c");
        a.connect(&c).unwrap();
        b.connect(&c).unwrap();

        sink.submit(Arc::clone(&a));
        sink.run_until_idle(10);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        assert_eq!(c.incoming_count(), 1);

        sink.submit(b);
        assert_eq!(sink.run_until_idle(10), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn hooks_fire_around_body_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let push = |entry: &'static str| {
            let log = Arc::clone(&log);
            move || log.lock().unwrap().push(entry)
        };

        let node = TaskNode::new("hooked", push("body"));
        node.on_begin(push("begin-1")).unwrap();
        node.on_begin(push("begin-2")).unwrap();
        node.on_done(push("done")).unwrap();
        let next = TaskNode::new("next", push("next"));
        node.connect(&next).unwrap();

        node.run(&InlineSink).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["begin-1", "begin-2", "body", "done", "next"]
        );
    }

    #[test]
    fn runs_exactly_once() {
        let node = TaskNode::empty("once");
        node.run(&InlineSink).unwrap();
        assert!(matches!(
            node.run(&InlineSink),
            Err(TaskError::AlreadyStarted { .. })
        ));
    }

    #[test]
    fn rejects_run_with_pending_predecessors() {
        let a = TaskNode::empty("a");
        let b = TaskNode::empty("b");
        a.connect(&b).unwrap();

        let result = b.run(&InlineSink);
        assert_eq!(
            result,
            Err(TaskError::NotReady {
                label: "b".to_owned(),
                incoming: 1,
            })
        );
        assert!(!b.has_started());
    }

    #[test]
    fn rejects_edges_after_start() {
        let a = TaskNode::empty("a");
        let b = TaskNode::empty("b");
        a.run(&InlineSink).unwrap();

        assert!(matches!(a.connect(&b), Err(TaskError::EdgeAfterStart { .. })));
        assert!(matches!(b.connect(&a), Err(TaskError::EdgeAfterStart { .. })));
        assert_eq!(b.incoming_count(), 0);
        assert!(a.on_done(|| {}).is_err());
    }

    #[test]
    fn rejects_self_edge() {
        let a = TaskNode::empty("a");
        assert!(matches!(a.connect(&a), Err(TaskError::SelfEdge { .. })));
    }

    #[test]
    fn failing_body_still_releases_successors() {
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let failing = TaskNode::fallible("failing", || Err(TaskFailure::new("boom")));
        let panicking = TaskNode::new("panicking", || {
            #[allow(clippy::panic)]
            {
                panic!("body exploded");
            }
        });
        let after = TaskNode::new("after", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        failing.connect(&panicking).unwrap();
        panicking.connect(&after).unwrap();

        failing.run(&InlineSink).unwrap();
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn diamond_runs_every_node_once_across_threads() {
        let sink = crate::sink::RayonSink::new(&crate::ThreadingConfig {
            worker_threads: 4,
            thread_name: "diamond".to_owned(),
        })
        .unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let head = TaskNode::empty("head");
        let tail = TaskNode::new("tail", move || done_tx.send(()).unwrap());
        for index in 0..64 {
            let runs = Arc::clone(&runs);
            let middle = TaskNode::new(format!("middle-{index}"), move || {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            head.connect(&middle).unwrap();
            middle.connect(&tail).unwrap();
        }

        sink.submit(head);
        done_rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .unwrap();
        // The tail only runs once every middle node has been counted.
        assert_eq!(runs.load(Ordering::SeqCst), 64);
    }
}
