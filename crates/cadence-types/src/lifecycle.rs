//! Lifecycle hooks shared by simulation objects and the world.
//!
//! Each hook fires at most once per corresponding transition, in the fixed
//! order construction, begin-play, any number of pause/resume pairs,
//! end-play, destruction. Objects destroyed before their first tick skip
//! construction and begin-play but still receive end-play and destruction.

/// Receiver of lifecycle transitions.
///
/// Hooks take `&self` because objects are shared with worker threads; use
/// interior mutability for state that changes in a hook. All methods have
/// empty default bodies.
pub trait Lifecycle: Send + Sync {
    /// The object has been constructed and is about to start ticking.
    fn on_constructed(&self) {}

    /// The object enters play. Fires right after [`on_constructed`].
    ///
    /// [`on_constructed`]: Lifecycle::on_constructed
    fn on_begin_play(&self) {}

    /// The world was paused.
    fn on_pause(&self) {}

    /// The world resumed after a pause.
    fn on_resume(&self) {}

    /// The object was claimed by a destroy request.
    fn on_end_play(&self) {}

    /// The object's storage is about to be released.
    fn on_destruction(&self) {}
}

/// Inert behavior for objects that only exist to own others.
impl Lifecycle for () {}
