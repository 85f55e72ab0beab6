//! Task graph primitives for the Cadence simulation core.
//!
//! A [`TaskNode`] is a unit of work with a dependency counter. Edges are
//! added with [`TaskNode::connect`] while the graph is being built; once a
//! node runs, every successor's counter is decremented and any successor
//! that reaches zero is handed to a [`WorkerSink`]. A [`TaskGroup`] bundles
//! an ordered (or parallel) set of nodes behind a trailing hook node and is
//! itself scheduled as a single node.
//!
//! # Modules
//!
//! - [`task`] -- [`TaskNode`], hooks, and execution
//! - [`group`] -- [`TaskGroup`] composites
//! - [`sink`] -- The [`WorkerSink`] contract and the inline, manual, and
//!   rayon-backed sinks
//! - [`config`] -- [`ThreadingConfig`] accepted by [`WorkerSink::configure`]
//! - [`error`] -- [`TaskError`], [`TaskFailure`], [`SinkError`]

pub mod config;
pub mod error;
pub mod group;
pub mod sink;
pub mod task;

pub use config::ThreadingConfig;
pub use error::{SinkError, TaskError, TaskFailure};
pub use group::{GroupOrder, TaskGroup};
pub use sink::{InlineSink, ManualSink, RayonSink, WorkerSink};
pub use task::{TaskNode, TaskRef};
