//! Demo population for the engine binary.
//!
//! Seeds the world with a small ownership forest of probe objects and a
//! few tick handlers, so a bare `cadence-engine` run exercises every part
//! of the cycle: first-tick dispatch, phase chaining, pause gating, and
//! cascading teardown at shutdown.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cadence_core::context;
use cadence_core::world::World;
use cadence_types::{Lifecycle, ObjectId, TickPhase};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::error::EngineError;

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Shape of the demo population, read from the `demo` section of
/// `cadence-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfig {
    /// Number of top-level objects.
    #[serde(default = "default_roots")]
    pub roots: u32,

    /// Number of children under each root.
    #[serde(default = "default_children_per_root")]
    pub children_per_root: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            children_per_root: default_children_per_root(),
        }
    }
}

const fn default_roots() -> u32 {
    2
}

const fn default_children_per_root() -> u32 {
    3
}

/// Load the demo section from the YAML file at `path`.
///
/// A missing file or a file without a `demo` key yields defaults.
pub fn load_demo_config(path: &Path) -> Result<DemoConfig, EngineError> {
    if !path.exists() {
        return Ok(DemoConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Demo {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Demo {
        message: format!("failed to parse config YAML: {e}"),
    })?;
    match raw.get("demo") {
        Some(section) => serde_yml::from_value(section.clone()).map_err(|e| EngineError::Demo {
            message: format!("failed to parse demo config: {e}"),
        }),
        None => Ok(DemoConfig::default()),
    }
}

// -----------------------------------------------------------------------
// Probe objects
// -----------------------------------------------------------------------

/// Spawn parameters handed to [`Probe`] construction through the world's
/// initializer stack.
#[derive(Debug, Clone, Default)]
struct ProbeSeed {
    label: String,
    depth: u32,
}

/// A demo object that logs its lifecycle.
#[derive(Debug)]
struct Probe {
    label: String,
    depth: u32,
}

impl Probe {
    fn from_initializer() -> Self {
        let seed = context::top_initializer::<ProbeSeed>().unwrap_or_else(|err| {
            warn!(error = %err, "Probe built without a seed");
            ProbeSeed::default()
        });
        Self {
            label: seed.label,
            depth: seed.depth,
        }
    }
}

impl Lifecycle for Probe {
    fn on_begin_play(&self) {
        debug!(probe = %self.label, depth = self.depth, "Probe begins play");
    }

    fn on_pause(&self) {
        trace!(probe = %self.label, "Probe paused");
    }

    fn on_resume(&self) {
        trace!(probe = %self.label, "Probe resumed");
    }

    fn on_end_play(&self) {
        debug!(probe = %self.label, "Probe ends play");
    }
}

// -----------------------------------------------------------------------
// Population
// -----------------------------------------------------------------------

/// Counters updated by the demo tick handlers.
#[derive(Debug, Default)]
pub struct DemoStats {
    /// Simulate-phase invocations.
    pub simulate_steps: AtomicU64,
    /// In-render invocations.
    pub frames: AtomicU64,
}

/// What [`populate`] created.
#[derive(Debug)]
pub struct Population {
    /// Top-level object ids.
    pub roots: Vec<ObjectId>,
    /// Total objects spawned.
    pub total: usize,
    /// Tick handler counters.
    pub stats: Arc<DemoStats>,
}

/// Spawn the demo forest and register the demo tick handlers.
pub fn populate(world: &World, config: &DemoConfig) -> Result<Population, EngineError> {
    let mut roots = Vec::new();
    let mut total = 0_usize;
    for root_index in 0..config.roots {
        let seed = ProbeSeed {
            label: format!("root-{root_index}"),
            depth: 0,
        };
        let root = world.spawn_with(seed.label.clone(), None, seed, Probe::from_initializer)?;
        total = total.saturating_add(1);
        for child_index in 0..config.children_per_root {
            let seed = ProbeSeed {
                label: format!("root-{root_index}/child-{child_index}"),
                depth: 1,
            };
            world.spawn_with(seed.label.clone(), Some(root), seed, Probe::from_initializer)?;
            total = total.saturating_add(1);
        }
        roots.push(root);
    }

    let stats = Arc::new(DemoStats::default());
    let counters = Arc::clone(&stats);
    world
        .ticks()
        .register_tick(TickPhase::Simulate, "demo-simulate", move |_phase, delta| {
            let step = counters.simulate_steps.fetch_add(1, Ordering::Relaxed);
            trace!(step, delta, "Simulate");
            Ok(())
        });
    let counters = Arc::clone(&stats);
    world
        .ticks()
        .register_tick(TickPhase::InRender, "demo-render", move |_phase, _delta| {
            counters.frames.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

    info!(
        roots = roots.len(),
        objects = total,
        "Demo population spawned"
    );
    Ok(Population {
        roots,
        total,
        stats,
    })
}
