//! Shared type definitions for the Cadence simulation core.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! object identifiers, the simulation's life stages, the fixed ordering of
//! tick phases, and the lifecycle hooks that objects (and the world itself)
//! receive.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for simulation object identifiers
//! - [`enums`] -- [`LifeStage`] and [`TickPhase`]
//! - [`lifecycle`] -- The [`Lifecycle`] hook trait

pub mod enums;
pub mod ids;
pub mod lifecycle;

pub use enums::{LifeStage, TickPhase};
pub use ids::ObjectId;
pub use lifecycle::Lifecycle;
