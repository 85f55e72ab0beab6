//! Point-in-time world status for logs and diagnostics.

use cadence_objects::RegistryCounts;
use cadence_types::LifeStage;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot returned by [`World::status`](crate::world::World::status).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldStatus {
    /// World name.
    pub name: String,
    /// Current life stage.
    pub stage: LifeStage,
    /// Cycles started since creation.
    pub cycles: u64,
    /// Scheduled-but-unfinished cycle tasks.
    pub in_flight: usize,
    /// Elapsed time reported for the most recent cycle, in seconds.
    pub last_delta_seconds: f64,
    /// Accumulated cycle time since play began, in seconds.
    pub total_seconds: f64,
    /// Object registry sizes.
    pub objects: RegistryCounts,
    /// When play began, if it has.
    pub started_at: Option<DateTime<Utc>>,
}
