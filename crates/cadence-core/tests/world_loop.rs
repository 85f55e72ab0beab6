//! Integration tests for the world's cycle chain.
//!
//! Most tests drive the world with a [`ManualSink`] so every node runs on
//! the test thread in a deterministic order. A cycle N has fully finished
//! once `cycles()` reports N + 1, because cycle N + 1 is only built by
//! cycle N's trailing node. One test runs on a real rayon pool to check
//! shutdown draining.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cadence_core::config::CadenceConfig;
use cadence_core::context;
use cadence_core::world::{World, WorldError};
use cadence_tasks::{ManualSink, RayonSink, TaskFailure, ThreadingConfig, WorkerSink};
use cadence_types::{LifeStage, Lifecycle, TickPhase};

fn config(name: &str, rate: f64) -> CadenceConfig {
    let mut config = CadenceConfig::default();
    config.world.name = name.to_owned();
    config.world.tick_rate = rate;
    config
}

fn manual_world(name: &str) -> (Arc<World>, Arc<ManualSink>) {
    let sink = Arc::new(ManualSink::new());
    let world = World::new(config(name, 1000.0), Arc::clone(&sink) as Arc<dyn WorkerSink>)
        .expect("world builds");
    (world, sink)
}

/// Step the manual sink until `world` has started `cycle`.
fn run_until_cycle(world: &World, sink: &ManualSink, cycle: u64) {
    while world.cycles() < cycle {
        assert!(sink.run_next(), "chain stalled before cycle {cycle}");
    }
}

/// Stop the chain and run whatever is left.
fn wind_down(world: &World, sink: &ManualSink) {
    world.end_play().unwrap();
    sink.run_until_idle(usize::MAX);
    assert_eq!(world.in_flight(), 0);
}

fn phase_log(world: &World) -> Arc<Mutex<Vec<TickPhase>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for phase in TickPhase::ALL {
        let log = Arc::clone(&log);
        world
            .ticks()
            .register_tick(phase, format!("log-{phase}"), move |phase, _delta| {
                log.lock().unwrap().push(phase);
                Ok(())
            });
    }
    log
}

#[test]
fn active_cycles_run_every_phase_in_order() {
    let (world, sink) = manual_world("active");
    let log = phase_log(&world);

    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 3);

    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 12);
    assert_eq!(&log[..6], &TickPhase::ALL);
    assert_eq!(&log[6..], &TickPhase::ALL);
    wind_down(&world, &sink);
}

#[test]
fn paused_cycles_skip_simulate_and_post_render() {
    let (world, sink) = manual_world("paused");
    let log = phase_log(&world);

    world.begin_play().unwrap();
    world.pause().unwrap();
    run_until_cycle(&world, &sink, 3);
    wind_down(&world, &sink);

    let expected = [
        TickPhase::InputParsing,
        TickPhase::Serialize,
        TickPhase::PreRender,
        TickPhase::InRender,
    ];
    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 12);
    for cycle in log.chunks(4) {
        assert_eq!(cycle, &expected);
    }
}

#[test]
fn failing_handler_does_not_stop_the_loop() {
    let (world, sink) = manual_world("failing");
    let after = Arc::new(AtomicUsize::new(0));
    world
        .ticks()
        .register_tick(TickPhase::Simulate, "broken", |_phase, _delta| {
            Err(TaskFailure::new("simulation diverged"))
        });
    let counter = Arc::clone(&after);
    world
        .ticks()
        .register_tick(TickPhase::PostRender, "after", move |_phase, _delta| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    world
        .ticks()
        .register_tick(TickPhase::PreRender, "panicky", |_phase, _delta| {
            panic!("render state poisoned")
        });

    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 4);
    assert_eq!(after.load(Ordering::SeqCst), 3);
    wind_down(&world, &sink);
}

#[test]
fn resume_does_not_start_a_second_chain() {
    let (world, sink) = manual_world("resume");
    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 2);
    let queued = sink.len();
    let in_flight = world.in_flight();

    world.pause().unwrap();
    world.resume().unwrap();
    assert_eq!(sink.len(), queued);
    assert_eq!(world.in_flight(), in_flight);
    wind_down(&world, &sink);
}

#[derive(Default)]
struct Hooks {
    calls: Mutex<Vec<(String, &'static str)>>,
}

impl Hooks {
    fn count(&self, hook: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, h)| *h == hook)
            .count()
    }

    /// Hooks received by the object called `name`, in order.
    fn of(&self, name: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, hook)| *hook)
            .collect()
    }
}

struct Tracked {
    name: String,
    hooks: Arc<Hooks>,
}

impl Tracked {
    fn new(name: &str, hooks: &Arc<Hooks>) -> Self {
        Self {
            name: name.to_owned(),
            hooks: Arc::clone(hooks),
        }
    }

    fn record(&self, hook: &'static str) {
        self.hooks.calls.lock().unwrap().push((self.name.clone(), hook));
    }
}

impl Lifecycle for Tracked {
    fn on_constructed(&self) {
        self.record("constructed");
    }
    fn on_begin_play(&self) {
        self.record("begin_play");
    }
    fn on_pause(&self) {
        self.record("pause");
    }
    fn on_resume(&self) {
        self.record("resume");
    }
    fn on_end_play(&self) {
        self.record("end_play");
    }
    fn on_destruction(&self) {
        self.record("destruction");
    }
}

#[test]
fn objects_follow_the_full_lifecycle() {
    let (world, sink) = manual_world("lifecycle");
    let hooks = Arc::new(Hooks::default());
    let root = world.spawn("root", None, Tracked::new("root", &hooks)).unwrap();
    world
        .spawn("child", Some(root), Tracked::new("child", &hooks))
        .unwrap();

    world.begin_play().unwrap();
    assert_eq!(hooks.count("begin_play"), 0);
    run_until_cycle(&world, &sink, 2);
    assert_eq!(hooks.count("constructed"), 2);
    assert_eq!(hooks.count("begin_play"), 2);

    world.pause().unwrap();
    world.resume().unwrap();
    assert_eq!(hooks.count("pause"), 2);
    assert_eq!(hooks.count("resume"), 2);

    let claimed = world.destroy_object(root).unwrap();
    assert_eq!(claimed.len(), 2);
    assert_eq!(hooks.count("end_play"), 2);
    assert_eq!(hooks.count("destruction"), 0);
    assert!(!world.objects().is_valid(root));

    // Finalization happens in the next cycle's input-parsing phase.
    run_until_cycle(&world, &sink, 4);
    assert_eq!(hooks.count("destruction"), 2);
    assert!(world.objects().is_empty());

    assert_eq!(
        hooks.of("root"),
        vec!["constructed", "begin_play", "pause", "resume", "end_play", "destruction"]
    );
    wind_down(&world, &sink);
}

#[test]
fn objects_begun_while_paused_pair_pause_with_resume() {
    let (world, sink) = manual_world("late-joiner");
    let hooks = Arc::new(Hooks::default());
    world.spawn("early", None, Tracked::new("early", &hooks)).unwrap();

    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 2);
    world.pause().unwrap();
    world.spawn("late", None, Tracked::new("late", &hooks)).unwrap();
    run_until_cycle(&world, &sink, 4);
    assert_eq!(hooks.of("late"), vec!["constructed", "begin_play", "pause"]);

    world.resume().unwrap();
    wind_down(&world, &sink);
    world.destroy().unwrap();

    let expected = vec![
        "constructed",
        "begin_play",
        "pause",
        "resume",
        "end_play",
        "destruction",
    ];
    assert_eq!(hooks.of("early"), expected);
    assert_eq!(hooks.of("late"), expected);
}

#[test]
fn destroy_tears_down_remaining_objects() {
    let (world, sink) = manual_world("teardown");
    let hooks = Arc::new(Hooks::default());
    let root = world.spawn("root", None, Tracked::new("root", &hooks)).unwrap();
    world
        .spawn("child", Some(root), Tracked::new("child", &hooks))
        .unwrap();
    world.spawn("loner", None, Tracked::new("loner", &hooks)).unwrap();

    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 2);
    wind_down(&world, &sink);

    assert_eq!(world.destroy().unwrap(), 3);
    assert_eq!(hooks.count("end_play"), 3);
    assert_eq!(hooks.count("destruction"), 3);
    assert_eq!(world.stage(), LifeStage::Destroyed);
}

#[test]
fn objects_destroyed_before_first_tick_never_begin() {
    let (world, sink) = manual_world("stillborn");
    let hooks = Arc::new(Hooks::default());
    let doomed = world.spawn("doomed", None, Tracked::new("doomed", &hooks)).unwrap();
    world.destroy_object(doomed).unwrap();

    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 2);
    wind_down(&world, &sink);

    assert_eq!(hooks.count("begin_play"), 0);
    assert_eq!(hooks.count("end_play"), 1);
    assert_eq!(hooks.count("destruction"), 1);
}

#[test]
fn drain_timeout_reports_outstanding_tasks() {
    let mut config = config("timeout", 1000.0);
    config.world.drain_timeout_ms = 20;
    let sink = Arc::new(ManualSink::new());
    let world = World::new(config, Arc::clone(&sink) as Arc<dyn WorkerSink>).unwrap();

    world.begin_play().unwrap();
    world.end_play().unwrap();
    // The kickoff node is queued but never run.
    assert!(matches!(
        world.destroy(),
        Err(WorldError::DrainTimeout {
            in_flight: 1,
            timeout_ms: 20
        })
    ));

    sink.run_until_idle(usize::MAX);
    assert_eq!(world.destroy().unwrap(), 0);
}

/// Reads its spawn parameter from the initializer stack.
struct Seeded {
    seed: u64,
}

impl Lifecycle for Seeded {
    fn on_constructed(&self) {
        assert_eq!(self.seed, 42);
    }
}

#[test]
fn handlers_and_builders_see_the_world_context() {
    let (world, sink) = manual_world("contextual");
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    world
        .ticks()
        .register_tick(TickPhase::Simulate, "probe", move |_phase, _delta| {
            let name = context::current()
                .and_then(|ctx| ctx.world())
                .map(|world| world.name().to_owned());
            *slot.lock().unwrap() = name;
            Ok(())
        });

    let seed = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&seed);
    world
        .spawn_with("seeded", None, 42_u64, || {
            let seed = context::top_initializer::<u64>().unwrap_or_default();
            *captured.lock().unwrap() = Some(seed);
            assert_eq!(context::current().unwrap().name(), "contextual");
            Seeded { seed }
        })
        .unwrap();
    assert_eq!(*seed.lock().unwrap(), Some(42));
    assert!(context::top_initializer::<u64>().is_err());
    assert!(context::current().is_none());

    world.begin_play().unwrap();
    run_until_cycle(&world, &sink, 2);
    assert_eq!(seen.lock().unwrap().as_deref(), Some("contextual"));
    wind_down(&world, &sink);
}

#[test]
fn rayon_world_drains_before_destroy() {
    let mut config = config("pooled", 500.0);
    config.threading = ThreadingConfig {
        worker_threads: 4,
        thread_name: "pooled".to_owned(),
    };
    let sink = RayonSink::new(&config.threading).unwrap();
    let world = World::new(config, Arc::new(sink)).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    for index in 0..8 {
        let ticks = Arc::clone(&ticks);
        world
            .ticks()
            .register_tick(TickPhase::Simulate, format!("fan-{index}"), move |_, _| {
                ticks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
    }
    let hooks = Arc::new(Hooks::default());
    world.spawn("worker", None, Tracked::new("worker", &hooks)).unwrap();

    world.begin_play().unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while world.cycles() < 5 {
        assert!(Instant::now() < deadline, "world stalled");
        std::thread::sleep(Duration::from_millis(2));
    }
    world.end_play().unwrap();
    assert_eq!(world.destroy().unwrap(), 1);

    assert_eq!(world.in_flight(), 0);
    // Every started cycle ran all eight tickables.
    let cycles = usize::try_from(world.cycles()).unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), cycles * 8);
    assert_eq!(hooks.count("begin_play"), 1);
    assert_eq!(hooks.count("destruction"), 1);
}
