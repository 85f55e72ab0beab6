//! The life-stage gating table.
//!
//! Decides which tick phases are chained into a cycle for the current
//! [`LifeStage`]. `Active` runs everything, `Paused` keeps only input and
//! presentation (so a paused world still reads input and renders), and the
//! non-ticking stages run nothing.

use cadence_types::{LifeStage, TickPhase};

/// Whether `phase` runs in a cycle built under `stage`.
pub const fn is_phase_allowed(stage: LifeStage, phase: TickPhase) -> bool {
    match stage {
        LifeStage::Active => true,
        LifeStage::Paused => matches!(
            phase,
            TickPhase::InputParsing
                | TickPhase::Serialize
                | TickPhase::PreRender
                | TickPhase::InRender
        ),
        LifeStage::Uninitialized | LifeStage::EndingPlay | LifeStage::Destroyed => false,
    }
}

/// The phases chained under `stage`, in execution order.
pub fn allowed_phases(stage: LifeStage) -> impl Iterator<Item = TickPhase> {
    TickPhase::ALL
        .into_iter()
        .filter(move |phase| is_phase_allowed(stage, *phase))
}
