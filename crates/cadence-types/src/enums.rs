//! Enumeration types shared across the simulation core.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Life stages
// ---------------------------------------------------------------------------

/// The simulation's current high-level mode. Exactly one is current at any
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifeStage {
    /// Created but play has not begun.
    Uninitialized,
    /// Every tick phase runs.
    Active,
    /// Only the presentation-side phases run.
    Paused,
    /// Play is ending; no new cycles are chained.
    EndingPlay,
    /// Torn down.
    Destroyed,
}

impl LifeStage {
    /// Every life stage, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Uninitialized,
        Self::Active,
        Self::Paused,
        Self::EndingPlay,
        Self::Destroyed,
    ];

    /// Whether the cycle chain keeps re-arming itself in this stage.
    pub const fn is_ticking(self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

impl core::fmt::Display for LifeStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::EndingPlay => "ending_play",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Tick phases
// ---------------------------------------------------------------------------

/// A named stage of one simulation cycle. Phases always execute in the
/// order of [`TickPhase::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TickPhase {
    /// Input collection; also hosts deferred first-tick dispatch.
    InputParsing,
    /// Simulation update.
    Simulate,
    /// State serialization (replication, snapshots).
    Serialize,
    /// Render preparation.
    PreRender,
    /// Render submission.
    InRender,
    /// Post-render bookkeeping.
    PostRender,
}

impl TickPhase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 6] = [
        Self::InputParsing,
        Self::Simulate,
        Self::Serialize,
        Self::PreRender,
        Self::InRender,
        Self::PostRender,
    ];

    /// Short name used in task labels and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputParsing => "input_parsing",
            Self::Simulate => "simulate",
            Self::Serialize => "serialize",
            Self::PreRender => "pre_render",
            Self::InRender => "in_render",
            Self::PostRender => "post_render",
        }
    }
}

impl core::fmt::Display for TickPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
