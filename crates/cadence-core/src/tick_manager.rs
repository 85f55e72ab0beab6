//! Per-phase registry of tick handlers.
//!
//! Two kinds of handler can be registered for a [`TickPhase`]:
//!
//! - **ticks** -- externally observable work. Each becomes one node of a
//!   parallel group, so independent tickables may run concurrently.
//! - **events** -- internal bookkeeping that must run right after the
//!   phase's ticks, one at a time in registration order.
//!
//! [`TickManager::get_tasks`] turns the handlers for one phase into that
//! pair of groups for one cycle. When a [`WorldContext`] is attached every
//! handler body runs inside it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cadence_tasks::{TaskFailure, TaskGroup, TaskNode, TaskRef};
use cadence_types::TickPhase;
use tracing::{debug, warn};

use crate::context::{ContextGuard, WorldContext};

/// A tick or event handler: receives the phase and the cycle's elapsed
/// seconds.
pub type TickFn = dyn Fn(TickPhase, f64) -> Result<(), TaskFailure> + Send + Sync;

/// Identifies a registered handler for [`TickManager::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickHandle(u64);

impl core::fmt::Display for TickHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "tick#{}", self.0)
    }
}

#[derive(Clone)]
struct Entry {
    handle: TickHandle,
    label: String,
    handler: Arc<TickFn>,
}

type PhaseTable = BTreeMap<TickPhase, Vec<Entry>>;

/// Registry of tick handlers, grouped by phase.
pub struct TickManager {
    ticks: RwLock<PhaseTable>,
    events: RwLock<PhaseTable>,
    context: RwLock<Option<Arc<WorldContext>>>,
    next_handle: AtomicU64,
}

impl core::fmt::Debug for TickManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TickManager")
            .field("ticks", &count(&read(&self.ticks)))
            .field("events", &count(&read(&self.events)))
            .finish_non_exhaustive()
    }
}

impl Default for TickManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TickManager {
    /// Create an empty manager with no context attached.
    pub fn new() -> Self {
        Self {
            ticks: RwLock::new(BTreeMap::new()),
            events: RwLock::new(BTreeMap::new()),
            context: RwLock::new(None),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Run every handler body built from now on inside `context`.
    pub fn attach_context(&self, context: Arc<WorldContext>) {
        *write(&self.context) = Some(context);
    }

    /// Register public work for `phase`.
    pub fn register_tick<F>(
        &self,
        phase: TickPhase,
        label: impl Into<String>,
        handler: F,
    ) -> TickHandle
    where
        F: Fn(TickPhase, f64) -> Result<(), TaskFailure> + Send + Sync + 'static,
    {
        self.insert(&self.ticks, phase, label.into(), Arc::new(handler))
    }

    /// Register private bookkeeping for `phase`.
    pub fn add_event<F>(
        &self,
        phase: TickPhase,
        label: impl Into<String>,
        handler: F,
    ) -> TickHandle
    where
        F: Fn(TickPhase, f64) -> Result<(), TaskFailure> + Send + Sync + 'static,
    {
        self.insert(&self.events, phase, label.into(), Arc::new(handler))
    }

    /// Remove a handler. Returns whether it was registered. Cycles already
    /// built keep running it.
    pub fn unregister(&self, handle: TickHandle) -> bool {
        [&self.ticks, &self.events].into_iter().any(|table| {
            let mut table = write(table);
            let mut found = false;
            for entries in table.values_mut() {
                let before = entries.len();
                entries.retain(|entry| entry.handle != handle);
                found |= entries.len() != before;
            }
            found
        })
    }

    /// Number of handlers registered for `phase` as `(ticks, events)`.
    pub fn handler_count(&self, phase: TickPhase) -> (usize, usize) {
        let ticks = read(&self.ticks).get(&phase).map_or(0, Vec::len);
        let events = read(&self.events).get(&phase).map_or(0, Vec::len);
        (ticks, events)
    }

    /// Build this cycle's `(public, private)` groups for `phase`.
    ///
    /// The public group is parallel over the phase's ticks; the private
    /// group runs the phase's events serially. Either may be empty, in
    /// which case it completes as soon as it runs.
    pub fn get_tasks(&self, phase: TickPhase, elapsed_seconds: f64) -> (TaskGroup, TaskGroup) {
        let context = read(&self.context).clone();
        let public = TaskGroup::parallel(format!("{phase}.ticks"));
        let private = TaskGroup::new(format!("{phase}.events"));

        for (table, group) in [(&self.ticks, &public), (&self.events, &private)] {
            let entries = read(table).get(&phase).cloned().unwrap_or_default();
            for entry in entries {
                let node = handler_node(entry, phase, elapsed_seconds, context.clone());
                if let Err(err) = group.add(node) {
                    warn!(phase = %phase, error = %err, "Dropped tick handler from cycle");
                }
            }
        }
        (public, private)
    }

    fn insert(
        &self,
        table: &RwLock<PhaseTable>,
        phase: TickPhase,
        label: String,
        handler: Arc<TickFn>,
    ) -> TickHandle {
        let handle = TickHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        debug!(phase = %phase, handle = %handle, label = %label, "Tick handler registered");
        write(table).entry(phase).or_default().push(Entry {
            handle,
            label,
            handler,
        });
        handle
    }
}

fn handler_node(
    entry: Entry,
    phase: TickPhase,
    elapsed_seconds: f64,
    context: Option<Arc<WorldContext>>,
) -> TaskRef {
    let Entry { label, handler, .. } = entry;
    TaskNode::fallible(label, move || {
        let _guard = context.map(ContextGuard::enter);
        handler(phase, elapsed_seconds)
    })
}

fn count(table: &PhaseTable) -> usize {
    table.values().map(Vec::len).sum()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Mutex, Weak};

    use cadence_tasks::{InlineSink, WorkerSink};

    use super::*;
    use crate::context;

    fn recorder(
        out: &Arc<Mutex<Vec<String>>>,
        tag: &str,
    ) -> impl Fn(TickPhase, f64) -> Result<(), TaskFailure> + Send + Sync + 'static {
        let out = Arc::clone(out);
        let tag = tag.to_owned();
        move |phase, _delta| {
            out.lock().unwrap().push(format!("{tag}@{phase}"));
            Ok(())
        }
    }

    fn run_phase(manager: &TickManager, phase: TickPhase, delta: f64) {
        let (public, private) = manager.get_tasks(phase, delta);
        public.connect(private.node()).unwrap();
        InlineSink.submit(public.into_node());
        assert!(private.node().has_started());
    }

    #[test]
    fn events_run_after_ticks_in_order() {
        let manager = TickManager::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        manager.add_event(TickPhase::Simulate, "e1", recorder(&out, "e1"));
        manager.register_tick(TickPhase::Simulate, "t1", recorder(&out, "t1"));
        manager.add_event(TickPhase::Simulate, "e2", recorder(&out, "e2"));
        manager.register_tick(TickPhase::InRender, "other", recorder(&out, "other"));

        run_phase(&manager, TickPhase::Simulate, 0.016);
        assert_eq!(
            *out.lock().unwrap(),
            vec!["t1@simulate", "e1@simulate", "e2@simulate"]
        );
        assert_eq!(manager.handler_count(TickPhase::Simulate), (1, 2));
    }

    #[test]
    fn handlers_receive_elapsed_seconds() {
        let manager = TickManager::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        manager.register_tick(TickPhase::PreRender, "probe", move |_phase, delta| {
            *sink.lock().unwrap() = Some(delta);
            Ok(())
        });
        run_phase(&manager, TickPhase::PreRender, 0.25);
        let delta = seen.lock().unwrap().unwrap();
        assert!((delta - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_phase_still_yields_runnable_groups() {
        let manager = TickManager::new();
        let (public, private) = manager.get_tasks(TickPhase::PostRender, 0.0);
        assert!(public.is_empty());
        assert!(private.is_empty());
        run_phase(&manager, TickPhase::PostRender, 0.0);
    }

    #[test]
    fn unregister_removes_handler() {
        let manager = TickManager::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        let tick = manager.register_tick(TickPhase::Simulate, "t", recorder(&out, "t"));
        let event = manager.add_event(TickPhase::Simulate, "e", recorder(&out, "e"));
        assert_ne!(tick, event);

        assert!(manager.unregister(tick));
        assert!(!manager.unregister(tick));
        run_phase(&manager, TickPhase::Simulate, 0.0);
        assert_eq!(*out.lock().unwrap(), vec!["e@simulate"]);

        assert!(manager.unregister(event));
        assert_eq!(manager.handler_count(TickPhase::Simulate), (0, 0));
    }

    #[test]
    fn failing_handler_does_not_block_events() {
        let manager = TickManager::new();
        let out = Arc::new(Mutex::new(Vec::new()));
        manager.register_tick(TickPhase::Simulate, "bad", |_phase, _delta| {
            Err(TaskFailure::new("no input"))
        });
        manager.add_event(TickPhase::Simulate, "e", recorder(&out, "e"));
        run_phase(&manager, TickPhase::Simulate, 0.0);
        assert_eq!(*out.lock().unwrap(), vec!["e@simulate"]);
    }

    #[test]
    fn handlers_run_inside_attached_context() {
        let manager = TickManager::new();
        manager.attach_context(Arc::new(WorldContext::new("ctx-world", Weak::new())));
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        manager.register_tick(TickPhase::InputParsing, "probe", move |_phase, _delta| {
            *sink.lock().unwrap() = context::current().map(|ctx| ctx.name().to_owned());
            Ok(())
        });

        run_phase(&manager, TickPhase::InputParsing, 0.0);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ctx-world"));
        assert!(context::current().is_none());
    }
}
