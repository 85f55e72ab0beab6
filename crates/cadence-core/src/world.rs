//! The world: life-stage state machine and the self-resubmitting cycle
//! chain.
//!
//! # Cycle chain
//!
//! One cycle is a single task graph:
//!
//! ```text
//! cycle-N -> phase1.ticks -> phase1.events -> phase2.ticks -> ... -> advance-cycle
//! ```
//!
//! Only phases allowed by the gating table for the current stage are
//! chained. The trailing `advance-cycle` node paces to the next boundary
//! and builds and submits cycle N+1, so the loop lives entirely on the
//! worker sink. It stops re-arming once the stage leaves `Active`/`Paused`.
//!
//! Every chained node is counted in flight until its done hooks fire.
//! Because the next cycle's nodes are counted before the current trailing
//! node finishes, the count only reaches zero once the chain has stopped.
//! That zero is what [`World::start_ticking`] requires before starting a
//! chain, and what [`World::destroy`] waits for.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use cadence_objects::{ObjectRegistry, RegistryError};
use cadence_tasks::{SinkError, TaskError, TaskNode, TaskRef, WorkerSink};
use cadence_types::{Lifecycle, LifeStage, ObjectId, TickPhase};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace};

use crate::config::{CadenceConfig, ConfigError};
use crate::context::{ContextGuard, InitializerGuard, WorldContext};
use crate::gating;
use crate::inflight::InFlight;
use crate::pacing::{CycleTiming, FramePacer, PacingError};
use crate::status::WorldStatus;
use crate::tick_manager::TickManager;

/// Errors raised by world construction and transitions.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The configuration failed validation.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The tick rate cannot be paced.
    #[error("pacing error: {source}")]
    Pacing {
        /// The underlying pacing error.
        #[from]
        source: PacingError,
    },

    /// The worker sink rejected the threading parameters.
    #[error("worker sink error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: SinkError,
    },

    /// An object registry operation failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// The requested transition is not legal from the current stage.
    #[error("cannot move world from {from} to {to}")]
    InvalidTransition {
        /// Stage at the time of the request.
        from: LifeStage,
        /// Requested stage.
        to: LifeStage,
    },

    /// Tasks were still in flight when the drain timeout expired.
    #[error("{in_flight} tasks still in flight after {timeout_ms} ms")]
    DrainTimeout {
        /// Tasks outstanding when the wait gave up.
        in_flight: usize,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// Objects cannot be added to a destroyed world.
    #[error("world {name} is destroyed")]
    Destroyed {
        /// World name.
        name: String,
    },
}

/// A simulation world driven by a worker sink.
pub struct World {
    name: String,
    config: CadenceConfig,
    stage: RwLock<LifeStage>,
    pacer: Mutex<FramePacer>,
    last_timing: Mutex<Option<CycleTiming>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    cycles: AtomicU64,
    in_flight: Arc<InFlight>,
    sink: Arc<dyn WorkerSink>,
    ticks: TickManager,
    objects: Arc<ObjectRegistry>,
    context: Arc<WorldContext>,
    this: Weak<Self>,
}

impl core::fmt::Debug for World {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("World")
            .field("name", &self.name)
            .field("stage", &self.stage())
            .field("cycles", &self.cycles())
            .field("in_flight", &self.in_flight())
            .field("ticks", &self.ticks)
            .field("objects", &self.objects.counts())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Build a world in the `Uninitialized` stage.
    ///
    /// Validates `config`, applies its threading parameters to `sink`, and
    /// registers the per-cycle housekeeping events on
    /// [`TickPhase::InputParsing`]: finalization of destroyed objects,
    /// then first-tick dispatch of newly registered ones.
    ///
    /// # Errors
    ///
    /// [`WorldError::Config`] or [`WorldError::Pacing`] for an unusable
    /// tick rate, and [`WorldError::Sink`] if the sink cannot be
    /// configured.
    pub fn new(config: CadenceConfig, sink: Arc<dyn WorkerSink>) -> Result<Arc<Self>, WorldError> {
        config.validate()?;
        let pacer = FramePacer::new(config.world.tick_rate)?;
        sink.configure(&config.threading)?;

        let world = Arc::new_cyclic(|this: &Weak<Self>| {
            let name = config.world.name.clone();
            let context = Arc::new(WorldContext::new(name.clone(), this.clone()));
            let ticks = TickManager::new();
            ticks.attach_context(Arc::clone(&context));
            Self {
                name,
                config,
                stage: RwLock::new(LifeStage::Uninitialized),
                pacer: Mutex::new(pacer),
                last_timing: Mutex::new(None),
                started_at: Mutex::new(None),
                cycles: AtomicU64::new(0),
                in_flight: Arc::new(InFlight::new()),
                sink,
                ticks,
                objects: Arc::new(ObjectRegistry::new()),
                context,
                this: this.clone(),
            }
        });
        world.register_housekeeping();

        info!(
            world = %world.name,
            tick_rate = world.config.world.tick_rate,
            worker_threads = world.config.threading.resolved_worker_threads(),
            "World created"
        );
        Ok(world)
    }

    fn register_housekeeping(&self) {
        let objects = Arc::clone(&self.objects);
        self.ticks
            .add_event(TickPhase::InputParsing, "finalize-removed", move |_, _| {
                objects.finalize_removed();
                Ok(())
            });
        let objects = Arc::clone(&self.objects);
        self.ticks
            .add_event(TickPhase::InputParsing, "first-tick-dispatch", move |_, _| {
                objects.dispatch_first_tick();
                Ok(())
            });
    }

    // -----------------------------------------------------------------------
    // Life stage transitions
    // -----------------------------------------------------------------------

    /// `Uninitialized -> Active`: start the cycle chain. Objects already
    /// registered are constructed and begin play in the first cycle.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidTransition`] from any other stage.
    pub fn begin_play(&self) -> Result<(), WorldError> {
        self.transition(&[LifeStage::Uninitialized], LifeStage::Active)?;
        lock(&self.pacer).reset();
        *lock(&self.started_at) = Some(Utc::now());
        self.start_ticking();
        Ok(())
    }

    /// `Active -> Paused`: later cycles chain only the phases the gating
    /// table allows while paused. Every begun object receives `on_pause`,
    /// and objects that begin play while paused receive it right after
    /// their begin-play.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidTransition`] from any other stage.
    pub fn pause(&self) -> Result<(), WorldError> {
        self.transition(&[LifeStage::Active], LifeStage::Paused)?;
        let _context = ContextGuard::enter(Arc::clone(&self.context));
        let notified = self.objects.pause_all();
        debug!(world = %self.name, objects = notified, "Objects paused");
        Ok(())
    }

    /// `Paused -> Active`. Every begun object receives `on_resume`, then
    /// ticking restarts through [`start_ticking`](Self::start_ticking), so
    /// a chain that is still in flight simply carries on.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidTransition`] from any other stage.
    pub fn resume(&self) -> Result<(), WorldError> {
        self.transition(&[LifeStage::Paused], LifeStage::Active)?;
        {
            let _context = ContextGuard::enter(Arc::clone(&self.context));
            let notified = self.objects.resume_all();
            debug!(world = %self.name, objects = notified, "Objects resumed");
        }
        self.start_ticking();
        Ok(())
    }

    /// `Active | Paused -> EndingPlay`: no further cycles are chained.
    /// Tasks already submitted still run to completion.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidTransition`] from any other stage.
    pub fn end_play(&self) -> Result<(), WorldError> {
        self.transition(&[LifeStage::Active, LifeStage::Paused], LifeStage::EndingPlay)?;
        Ok(())
    }

    /// `Uninitialized | EndingPlay -> Destroyed`: wait for every in-flight
    /// task to finish, then tear down all remaining objects (end-play for
    /// those not yet claimed, then destruction). Returns the number of
    /// objects torn down.
    ///
    /// The wait is bounded by `world.drain_timeout_ms` when non-zero.
    /// Calling `destroy` again on a destroyed world repeats the wait and
    /// teardown, which lets a caller retry after a timeout.
    ///
    /// # Errors
    ///
    /// [`WorldError::InvalidTransition`] from `Active` or `Paused`, and
    /// [`WorldError::DrainTimeout`] if tasks are still running when the
    /// timeout expires (objects are left untouched in that case).
    pub fn destroy(&self) -> Result<usize, WorldError> {
        self.transition(
            &[LifeStage::Uninitialized, LifeStage::EndingPlay, LifeStage::Destroyed],
            LifeStage::Destroyed,
        )?;

        let timeout_ms = self.config.world.drain_timeout_ms;
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        if !self.in_flight.wait_idle(timeout) {
            let in_flight = self.in_flight.load();
            error!(world = %self.name, in_flight, timeout_ms, "Drain timed out");
            return Err(WorldError::DrainTimeout {
                in_flight,
                timeout_ms,
            });
        }

        let _context = ContextGuard::enter(Arc::clone(&self.context));
        let torn_down = self.objects.clear();
        info!(
            world = %self.name,
            cycles = self.cycles(),
            objects = torn_down,
            "World destroyed"
        );
        Ok(torn_down)
    }

    fn transition(&self, from: &[LifeStage], to: LifeStage) -> Result<(), WorldError> {
        let previous = {
            let mut stage = self.stage.write().unwrap_or_else(PoisonError::into_inner);
            let previous = *stage;
            if !from.contains(&previous) {
                return Err(WorldError::InvalidTransition { from: previous, to });
            }
            *stage = to;
            previous
        };
        if previous != to {
            info!(world = %self.name, from = %previous, to = %to, "Life stage changed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cycle chain
    // -----------------------------------------------------------------------

    /// Submit a new cycle chain unless one is already in flight or the
    /// stage does not tick. Returns whether a chain was started.
    pub fn start_ticking(&self) -> bool {
        if !self.stage().is_ticking() {
            return false;
        }
        if !self.in_flight.try_claim_idle() {
            trace!(world = %self.name, "Cycle chain already in flight");
            return false;
        }

        let kickoff = self.advance_node();
        let in_flight = Arc::clone(&self.in_flight);
        if let Err(err) = kickoff.on_done(move || in_flight.end()) {
            error!(world = %self.name, error = %err, "Failed to arm cycle chain");
            self.in_flight.end();
            return false;
        }
        debug!(world = %self.name, "Cycle chain started");
        self.sink.submit(kickoff);
        true
    }

    /// A node that builds and submits the next cycle when run.
    fn advance_node(&self) -> TaskRef {
        let world = self.this.clone();
        TaskNode::new("advance-cycle", move || {
            if let Some(world) = world.upgrade() {
                world.advance_cycle();
            }
        })
    }

    fn advance_cycle(&self) {
        if !self.stage().is_ticking() {
            debug!(world = %self.name, stage = %self.stage(), "Cycle chain stopped");
            return;
        }

        let timing = lock(&self.pacer).wait_for_next_step();
        *lock(&self.last_timing) = Some(timing);

        // Pacing may have slept through a transition.
        let stage = self.stage();
        if !stage.is_ticking() {
            debug!(world = %self.name, stage = %stage, "Cycle chain stopped");
            return;
        }

        let cycle = self.cycles.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        debug!(
            world = %self.name,
            cycle,
            stage = %stage,
            delta = ?timing.delta,
            slept = ?timing.slept,
            total_seconds = timing.total_seconds(),
            "Advancing cycle"
        );

        match self.build_cycle(cycle, stage, timing.delta_seconds()) {
            Ok(head) => self.sink.submit(head),
            Err(err) => {
                error!(
                    world = %self.name,
                    cycle,
                    error = %err,
                    "Failed to build cycle, ticking stopped"
                );
            }
        }
    }

    /// Wire one cycle's chain and count every node in flight. Returns the
    /// head; nothing is submitted.
    fn build_cycle(
        &self,
        cycle: u64,
        stage: LifeStage,
        delta_seconds: f64,
    ) -> Result<TaskRef, TaskError> {
        let head = TaskNode::empty(format!("cycle-{cycle}"));
        let mut chain = vec![Arc::clone(&head)];
        let mut tail = Arc::clone(&head);

        for phase in gating::allowed_phases(stage) {
            let (public, private) = self.ticks.get_tasks(phase, delta_seconds);
            let public = public.into_node();
            let private = private.into_node();
            tail.connect(&public)?;
            public.connect(&private)?;
            chain.push(public);
            chain.push(Arc::clone(&private));
            tail = private;
        }

        let next = self.advance_node();
        tail.connect(&next)?;
        chain.push(next);

        // Hooks first: a failure here leaves nothing counted.
        for node in &chain {
            let in_flight = Arc::clone(&self.in_flight);
            node.on_done(move || in_flight.end())?;
        }
        for _ in &chain {
            self.in_flight.begin();
        }
        trace!(world = %self.name, cycle, nodes = chain.len(), "Cycle chain built");
        Ok(head)
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    /// Register `behavior` as a new object. It is constructed and begins
    /// play during the next cycle's input-parsing phase.
    ///
    /// # Errors
    ///
    /// [`WorldError::Destroyed`] once the world is destroyed, and
    /// [`WorldError::Registry`] for an unavailable owner.
    pub fn spawn<L>(
        &self,
        name: impl Into<String>,
        owner: Option<ObjectId>,
        behavior: L,
    ) -> Result<ObjectId, WorldError>
    where
        L: Lifecycle + 'static,
    {
        if self.stage() == LifeStage::Destroyed {
            return Err(WorldError::Destroyed {
                name: self.name.clone(),
            });
        }
        Ok(self.objects.register(name, owner, behavior)?)
    }

    /// Build an object with `initializer` available to the build closure
    /// through [`top_initializer`](crate::context::top_initializer), then
    /// register it like [`spawn`](Self::spawn). The closure also runs
    /// inside this world's context.
    ///
    /// # Errors
    ///
    /// Same as [`spawn`](Self::spawn).
    pub fn spawn_with<I, L, F>(
        &self,
        name: impl Into<String>,
        owner: Option<ObjectId>,
        initializer: I,
        build: F,
    ) -> Result<ObjectId, WorldError>
    where
        I: Any,
        L: Lifecycle + 'static,
        F: FnOnce() -> L,
    {
        let behavior = {
            let _context = ContextGuard::enter(Arc::clone(&self.context));
            let _initializer = InitializerGuard::push(initializer);
            build()
        };
        self.spawn(name, owner, behavior)
    }

    /// Destroy the ownership subtree rooted at `id`. End-play fires now,
    /// leaf-first; destruction follows in the next cycle's input-parsing
    /// phase. Returns the claimed ids, leaf-first.
    ///
    /// # Errors
    ///
    /// [`WorldError::Registry`] for an unknown or already destroyed id.
    pub fn destroy_object(&self, id: ObjectId) -> Result<Vec<ObjectId>, WorldError> {
        let _context = ContextGuard::enter(Arc::clone(&self.context));
        Ok(self.objects.destroy(id)?)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// World name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the world was built with.
    pub const fn config(&self) -> &CadenceConfig {
        &self.config
    }

    /// Current life stage.
    pub fn stage(&self) -> LifeStage {
        *self.stage.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cycles started since creation.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Scheduled-but-unfinished cycle tasks.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load()
    }

    /// Timing of the most recent cycle boundary.
    pub fn last_timing(&self) -> Option<CycleTiming> {
        *lock(&self.last_timing)
    }

    /// The object registry.
    pub const fn objects(&self) -> &Arc<ObjectRegistry> {
        &self.objects
    }

    /// The tick handler registry.
    pub const fn ticks(&self) -> &TickManager {
        &self.ticks
    }

    /// This world's thread context.
    pub const fn context(&self) -> &Arc<WorldContext> {
        &self.context
    }

    /// Snapshot for logs and diagnostics.
    pub fn status(&self) -> WorldStatus {
        let timing = self.last_timing();
        WorldStatus {
            name: self.name.clone(),
            stage: self.stage(),
            cycles: self.cycles(),
            in_flight: self.in_flight(),
            last_delta_seconds: timing.map_or(0.0, |t| t.delta_seconds()),
            total_seconds: timing.map_or(0.0, |t| t.total_seconds()),
            objects: self.objects.counts(),
            started_at: *lock(&self.started_at),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_tasks::ManualSink;

    use super::*;

    fn manual_world(rate: f64) -> (Arc<World>, Arc<ManualSink>) {
        let mut config = CadenceConfig::default();
        config.world.name = "unit".to_owned();
        config.world.tick_rate = rate;
        let sink = Arc::new(ManualSink::new());
        let world = World::new(config, Arc::clone(&sink) as Arc<dyn WorkerSink>).unwrap();
        (world, sink)
    }

    #[test]
    fn new_rejects_bad_rate() {
        let mut config = CadenceConfig::default();
        config.world.tick_rate = 0.0;
        let result = World::new(config, Arc::new(ManualSink::new()));
        assert!(matches!(result, Err(WorldError::Config { .. })));
    }

    #[test]
    fn new_world_is_idle() {
        let (world, sink) = manual_world(1000.0);
        assert_eq!(world.stage(), LifeStage::Uninitialized);
        assert_eq!(world.in_flight(), 0);
        assert_eq!(world.cycles(), 0);
        assert!(sink.is_empty());
        assert_eq!(world.ticks().handler_count(TickPhase::InputParsing), (0, 2));
        assert!(!world.start_ticking());
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        let (world, sink) = manual_world(1000.0);
        assert!(matches!(
            world.pause(),
            Err(WorldError::InvalidTransition {
                from: LifeStage::Uninitialized,
                to: LifeStage::Paused
            })
        ));

        world.begin_play().unwrap();
        assert!(world.begin_play().is_err());
        assert!(matches!(
            world.destroy(),
            Err(WorldError::InvalidTransition { .. })
        ));
        world.pause().unwrap();
        assert!(world.pause().is_err());
        world.resume().unwrap();
        world.end_play().unwrap();
        assert!(world.resume().is_err());

        sink.run_until_idle(usize::MAX);
        assert_eq!(world.destroy().unwrap(), 0);
        assert_eq!(world.stage(), LifeStage::Destroyed);
        assert!(matches!(
            world.spawn("late", None, ()),
            Err(WorldError::Destroyed { .. })
        ));
    }

    #[test]
    fn begin_play_submits_one_kickoff() {
        let (world, sink) = manual_world(1000.0);
        world.begin_play().unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(world.in_flight(), 1);

        // Already in flight: no duplicate chain.
        assert!(!world.start_ticking());
        world.pause().unwrap();
        world.resume().unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn one_cycle_counts_every_node() {
        let (world, sink) = manual_world(1000.0);
        world.begin_play().unwrap();

        // Run the kickoff: it builds cycle 1 and finishes itself.
        assert!(sink.run_next());
        assert_eq!(world.cycles(), 1);
        // head + 6 phases * (ticks, events) + advance
        assert_eq!(world.in_flight(), 14);
        assert!(world.last_timing().is_some());
    }

    #[test]
    fn chain_stops_after_end_play_and_drains() {
        let (world, sink) = manual_world(1000.0);
        world.begin_play().unwrap();
        world.end_play().unwrap();
        assert_eq!(sink.run_until_idle(usize::MAX), 1);
        assert_eq!(world.in_flight(), 0);
        assert_eq!(world.cycles(), 0);
    }

    #[test]
    fn status_reflects_progress() {
        let (world, sink) = manual_world(1000.0);
        world.spawn("a", None, ()).unwrap();
        let before = world.status();
        assert_eq!(before.stage, LifeStage::Uninitialized);
        assert!(before.started_at.is_none());
        assert_eq!(before.objects.pending, 1);

        world.begin_play().unwrap();
        while world.cycles() < 2 {
            assert!(sink.run_next());
        }
        let after = world.status();
        assert_eq!(after.stage, LifeStage::Active);
        assert_eq!(after.cycles, 2);
        assert!(after.started_at.is_some());
        assert!(after.last_delta_seconds > 0.0);
        assert_eq!(after.objects.pending, 0);
        assert_eq!(after.name, "unit");
    }
}
