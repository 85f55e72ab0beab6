//! Simulation object storage for the Cadence simulation core.
//!
//! The [`ObjectRegistry`] owns every registered [`SimObject`], tracks the
//! ownership forest between them, defers each object's first lifecycle
//! dispatch to the tick thread, and tears down whole ownership subtrees in
//! two steps: a destroy request that claims the subtree (end-play), and a
//! later finalization that releases storage (destruction).
//!
//! # Modules
//!
//! - [`object`] -- [`SimObject`], a registered object and its identity
//! - [`registry`] -- [`ObjectRegistry`] and its create/destroy protocol
//! - [`error`] -- [`RegistryError`]

pub mod error;
pub mod object;
pub mod registry;

pub use error::RegistryError;
pub use object::SimObject;
pub use registry::{ObjectRegistry, RegistryCounts};
