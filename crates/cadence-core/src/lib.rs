//! Phased, fixed-cadence simulation loop for the Cadence simulation core.
//!
//! This crate owns the [`World`](world::World): a life-stage state machine
//! whose cycles are task graphs submitted to a worker sink. Each cycle
//! chains the tick phases allowed for the current stage, and its last node
//! paces to the next boundary and submits the following cycle.
//!
//! # Modules
//!
//! - [`world`] -- The world, its transitions, and the cycle chain.
//! - [`tick_manager`] -- Per-phase tick and event handler registry.
//! - [`gating`] -- Which phases run in which life stage.
//! - [`pacing`] -- Best-effort fixed-rate cycle pacing.
//! - [`inflight`] -- In-flight task counter with a drain wait.
//! - [`context`] -- Scoped per-thread world context and initializer stack.
//! - [`config`] -- Configuration loading from `cadence-config.yaml` into
//!   strongly-typed structs.
//! - [`status`] -- Serializable world status snapshot.

pub mod config;
pub mod context;
pub mod gating;
pub mod inflight;
pub mod pacing;
pub mod status;
pub mod tick_manager;
pub mod world;
