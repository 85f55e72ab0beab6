//! Registered simulation objects.

use std::sync::atomic::{AtomicBool, Ordering};

use cadence_types::{Lifecycle, ObjectId};
use tracing::trace;

/// A simulation object owned by a registry.
///
/// Wraps caller-provided behavior with the identity the registry assigns:
/// a unique id, a name, and at most one owner. Lifecycle calls are
/// forwarded to the behavior.
pub struct SimObject {
    id: ObjectId,
    name: String,
    owner: Option<ObjectId>,
    begun: AtomicBool,
    ended: AtomicBool,
    behavior: Box<dyn Lifecycle>,
}

impl core::fmt::Debug for SimObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimObject")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("begun", &self.has_begun())
            .field("ended", &self.has_ended())
            .finish_non_exhaustive()
    }
}

impl SimObject {
    pub(crate) fn new(name: String, owner: Option<ObjectId>, behavior: Box<dyn Lifecycle>) -> Self {
        Self {
            id: ObjectId::new(),
            name,
            owner,
            begun: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            behavior,
        }
    }

    /// Unique id.
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Name given at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning object, if any.
    pub const fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    /// Whether first-tick dispatch has run for this object.
    pub fn has_begun(&self) -> bool {
        self.begun.load(Ordering::Acquire)
    }

    /// Whether `on_end_play` has returned for this object.
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// The caller-provided behavior.
    pub fn behavior(&self) -> &dyn Lifecycle {
        self.behavior.as_ref()
    }

    pub(crate) fn mark_begun(&self) {
        self.begun.store(true, Ordering::Release);
    }

    pub(crate) fn mark_ended(&self) {
        self.ended.store(true, Ordering::Release);
    }
}

impl Lifecycle for SimObject {
    fn on_constructed(&self) {
        trace!(object = %self.id, name = %self.name, "on_constructed");
        self.behavior.on_constructed();
    }

    fn on_begin_play(&self) {
        trace!(object = %self.id, name = %self.name, "on_begin_play");
        self.behavior.on_begin_play();
    }

    fn on_pause(&self) {
        self.behavior.on_pause();
    }

    fn on_resume(&self) {
        self.behavior.on_resume();
    }

    fn on_end_play(&self) {
        trace!(object = %self.id, name = %self.name, "on_end_play");
        self.behavior.on_end_play();
    }

    fn on_destruction(&self) {
        trace!(object = %self.id, name = %self.name, "on_destruction");
        self.behavior.on_destruction();
    }
}
