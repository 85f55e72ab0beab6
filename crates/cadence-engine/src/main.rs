//! Engine binary for the Cadence simulation core.
//!
//! This is the host entry point: it loads configuration, builds the worker
//! pool and the world, seeds a demo population, and runs the cycle chain
//! until a run boundary is reached or the process is interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, or
//!    `cadence-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the rayon worker pool
//! 4. Create the world
//! 5. Spawn the demo population
//! 6. Begin play and wait for Ctrl-C or a run boundary
//! 7. End play, drain, destroy, and log the final status

mod demo;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use cadence_core::config::{CadenceConfig, SimulationBoundsConfig};
use cadence_core::world::World;
use cadence_tasks::RayonSink;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file read when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "cadence-config.yaml";

/// How often run boundaries are checked.
const BOUNDARY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why the run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    CycleLimit,
    TimeLimit,
}

impl core::fmt::Display for StopReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            Self::Interrupted => "interrupted",
            Self::CycleLimit => "cycle_limit",
            Self::TimeLimit => "time_limit",
        };
        f.write_str(reason)
    }
}

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step, a transition, or the
/// shutdown drain fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so remember where it
    //    came from and report it below.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("cadence-engine starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        world_name = %config.world.name,
        tick_rate = config.world.tick_rate,
        drain_timeout_ms = config.world.drain_timeout_ms,
        max_cycles = config.simulation.max_cycles,
        max_real_time_seconds = config.simulation.max_real_time_seconds,
        "Run parameters"
    );

    // 3. Build the worker pool.
    let sink = RayonSink::new(&config.threading).map_err(EngineError::from)?;
    info!(threads = sink.current_num_threads(), "Worker pool ready");

    // 4. Create the world.
    let bounds = config.simulation.clone();
    let world = World::new(config, Arc::new(sink)).map_err(EngineError::from)?;

    // 5. Spawn the demo population.
    let demo_config = demo::load_demo_config(&config_path)?;
    let population = demo::populate(&world, &demo_config)?;

    // 6. Run.
    world.begin_play().map_err(EngineError::from)?;
    let reason = run_until_stopped(&world, &bounds).await;
    info!(reason = %reason, cycles = world.cycles(), "Run loop finished");

    // 7. Shut down. The drain wait blocks, so keep it off the runtime.
    world.end_play().map_err(EngineError::from)?;
    let closing = Arc::clone(&world);
    let torn_down = tokio::task::spawn_blocking(move || closing.destroy())
        .await
        .map_err(EngineError::from)?
        .map_err(EngineError::from)?;

    let status = serde_json::to_string(&world.status()).map_err(EngineError::from)?;
    info!(
        objects_torn_down = torn_down,
        spawned = population.total,
        simulate_steps = population.stats.simulate_steps.load(Ordering::Relaxed),
        frames = population.stats.frames.load(Ordering::Relaxed),
        status = %status,
        "cadence-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist. The flag reports whether the file was read.
fn load_config(path: &Path) -> Result<(CadenceConfig, bool), EngineError> {
    if path.exists() {
        Ok((CadenceConfig::from_file(path)?, true))
    } else {
        Ok((CadenceConfig::default(), false))
    }
}

/// Wait until Ctrl-C or a configured run boundary.
async fn run_until_stopped(world: &World, bounds: &SimulationBoundsConfig) -> StopReason {
    let started = Instant::now();
    let max_real_time = Duration::from_secs(bounds.max_real_time_seconds);
    let mut poll = tokio::time::interval(BOUNDARY_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut signals = true;

    loop {
        tokio::select! {
            result = &mut ctrl_c, if signals => {
                match result {
                    Ok(()) => return StopReason::Interrupted,
                    Err(e) => {
                        warn!(error = %e, "Failed to listen for Ctrl-C, relying on run boundaries");
                        signals = false;
                    }
                }
            }
            _ = poll.tick() => {
                if bounds.max_cycles > 0 && world.cycles() >= bounds.max_cycles {
                    return StopReason::CycleLimit;
                }
                if bounds.max_real_time_seconds > 0 && started.elapsed() >= max_real_time {
                    return StopReason::TimeLimit;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_tasks::{ManualSink, WorkerSink};

    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let (config, from_file) = load_config(Path::new("no-such-config.yaml")).unwrap();
        assert!(!from_file);
        assert_eq!(config, CadenceConfig::default());
    }

    #[test]
    fn stop_reasons_display_as_snake_case() {
        assert_eq!(StopReason::CycleLimit.to_string(), "cycle_limit");
        assert_eq!(StopReason::Interrupted.to_string(), "interrupted");
    }

    #[tokio::test]
    async fn time_limit_stops_the_run() {
        let world = World::new(
            CadenceConfig::default(),
            Arc::new(ManualSink::new()) as Arc<dyn WorkerSink>,
        )
        .unwrap();
        let bounds = SimulationBoundsConfig {
            max_cycles: 0,
            max_real_time_seconds: 1,
        };
        let reason = run_until_stopped(&world, &bounds).await;
        assert_eq!(reason, StopReason::TimeLimit);
    }
}
