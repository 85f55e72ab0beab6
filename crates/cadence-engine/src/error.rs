//! Error types for the Cadence engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup, the run, and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// The worker pool could not be built.
    #[error("worker pool error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: cadence_tasks::SinkError,
    },

    /// World construction or a life stage transition failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: cadence_core::world::WorldError,
    },

    /// The blocking shutdown task did not complete.
    #[error("shutdown task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },

    /// The demo population section could not be read.
    #[error("demo config error: {message}")]
    Demo {
        /// Description of the failure.
        message: String,
    },

    /// The final status snapshot could not be serialized.
    #[error("status serialization failed: {source}")]
    Status {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
