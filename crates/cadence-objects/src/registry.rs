//! Thread-safe object registry with cascading ownership teardown.
//!
//! # Indices
//!
//! - `created` -- every stored object, keyed by id (owning)
//! - `assigned` -- per owner, the ids of its live children
//! - `removed` -- ids claimed by a destroy request but not yet finalized,
//!   as a set (validity checks) and in claim order (finalization)
//! - `pending` -- objects awaiting first-tick dispatch
//!
//! # Locking
//!
//! Each index has its own lock. Operations that need several take them in
//! one fixed order: `created`, `assigned`, `removed`, `pending`. User hooks
//! are never invoked while any index lock is held, so a hook may register
//! or destroy objects without deadlocking.
//!
//! Hook delivery itself is serialized by a reentrant `lifecycle` lock,
//! taken before any index lock by first-tick dispatch, destroy,
//! finalization, and pause/resume broadcasts. Across threads an object
//! therefore sees its hooks in lifecycle order: a destroy racing a
//! dispatch waits for begin-play to return, and finalization waits for
//! end-play. The owning thread may re-enter from inside a hook. A hook must
//! not block on another thread that is itself waiting for this registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cadence_types::{Lifecycle, ObjectId};
use parking_lot::ReentrantMutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::RegistryError;
use crate::object::SimObject;

/// Objects claimed by destroy requests, awaiting finalization.
#[derive(Debug, Default)]
struct RemovedObjects {
    set: HashSet<ObjectId>,
    /// Claim order: leaf-first within each destroyed subtree.
    order: Vec<ObjectId>,
}

/// One level of the iterative post-order walk in [`ObjectRegistry::destroy`].
struct Frame {
    id: ObjectId,
    /// Children still to visit, reversed so `pop` yields them in order.
    remaining: Vec<ObjectId>,
}

impl Frame {
    fn new(id: ObjectId, children: Option<Vec<ObjectId>>) -> Self {
        let mut remaining = children.unwrap_or_default();
        remaining.reverse();
        Self { id, remaining }
    }
}

/// Sizes of the registry's indices at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RegistryCounts {
    /// Objects in storage, including claimed ones not yet finalized.
    pub registered: usize,
    /// Objects awaiting first-tick dispatch.
    pub pending: usize,
    /// Objects claimed by a destroy request, awaiting finalization.
    pub removed: usize,
}

/// Ownership-tree storage for simulation objects.
#[derive(Debug)]
pub struct ObjectRegistry {
    lifecycle: ReentrantMutex<()>,
    paused: AtomicBool,
    created: RwLock<HashMap<ObjectId, Arc<SimObject>>>,
    assigned: RwLock<HashMap<ObjectId, Vec<ObjectId>>>,
    removed: RwLock<RemovedObjects>,
    pending: Mutex<Vec<Arc<SimObject>>>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            lifecycle: ReentrantMutex::new(()),
            paused: AtomicBool::new(false),
            created: RwLock::default(),
            assigned: RwLock::default(),
            removed: RwLock::default(),
            pending: Mutex::default(),
        }
    }

    /// Take ownership of `behavior` as a new object.
    ///
    /// The object is stored, appended to its owner's children, and queued
    /// for first-tick dispatch. Safe to call from any thread, including
    /// from inside another object's lifecycle hook.
    ///
    /// # Errors
    ///
    /// [`RegistryError::OwnerUnavailable`] if `owner` is unregistered or
    /// already claimed by a destroy request.
    pub fn register<L>(
        &self,
        name: impl Into<String>,
        owner: Option<ObjectId>,
        behavior: L,
    ) -> Result<ObjectId, RegistryError>
    where
        L: Lifecycle + 'static,
    {
        let object = Arc::new(SimObject::new(name.into(), owner, Box::new(behavior)));
        let id = object.id();
        {
            let mut created = write(&self.created);
            let mut assigned = write(&self.assigned);
            if let Some(owner) = owner {
                let removed = read(&self.removed);
                if !created.contains_key(&owner) || removed.set.contains(&owner) {
                    return Err(RegistryError::OwnerUnavailable { owner });
                }
                assigned.entry(owner).or_default().push(id);
            }
            created.insert(id, Arc::clone(&object));
        }
        debug!(object = %id, name = %object.name(), owner = ?owner, "Object registered");
        lock(&self.pending).push(object);
        Ok(id)
    }

    /// Run deferred first-tick dispatch.
    ///
    /// Drains the pending queue, then fires `on_constructed` followed by
    /// `on_begin_play` on each object in registration order. While the
    /// registry is paused each object also receives `on_pause` right after
    /// begin-play, so a later resume always has a matching pause. Objects
    /// claimed by a destroy request in the meantime are skipped. Objects
    /// registered by the hooks themselves wait for the next dispatch.
    /// Returns the number of objects started.
    pub fn dispatch_first_tick(&self) -> usize {
        let _hooks = self.lifecycle.lock();
        let batch = std::mem::take(&mut *lock(&self.pending));
        let mut started = 0_usize;
        for object in batch {
            if !self.is_valid(object.id()) {
                continue;
            }
            object.on_constructed();
            object.on_begin_play();
            object.mark_begun();
            if self.is_paused() && self.is_valid(object.id()) {
                object.on_pause();
            }
            started = started.saturating_add(1);
        }
        if started > 0 {
            trace!(started, "First-tick dispatch complete");
        }
        started
    }

    /// Deliver `on_pause` to every begun object and keep pausing objects
    /// that begin play later. Returns the number of objects notified, or
    /// 0 if the registry was already paused.
    pub fn pause_all(&self) -> usize {
        let _hooks = self.lifecycle.lock();
        if self.paused.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let objects = self.active_objects();
        for object in &objects {
            object.on_pause();
        }
        objects.len()
    }

    /// Deliver `on_resume` to every begun object. Returns the number of
    /// objects notified, or 0 if the registry was not paused.
    pub fn resume_all(&self) -> usize {
        let _hooks = self.lifecycle.lock();
        if !self.paused.swap(false, Ordering::AcqRel) {
            return 0;
        }
        let objects = self.active_objects();
        for object in &objects {
            object.on_resume();
        }
        objects.len()
    }

    /// Whether [`pause_all`](Self::pause_all) is in effect.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Claim the ownership subtree rooted at `id`.
    ///
    /// Walks the subtree iteratively in post-order, so depth is bounded
    /// only by memory. Every visited object is added to the removed set,
    /// erased from the ownership index, and dropped from the pending queue;
    /// the root is also detached from its owner. Then, with no index lock
    /// held, `on_end_play` fires in the same leaf-first order: an object's
    /// hook never runs before its descendants' hooks.
    ///
    /// Returns the claimed ids in leaf-first order. Storage is released
    /// later by [`finalize_removed`](Self::finalize_removed).
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] for an unknown id and
    /// [`RegistryError::AlreadyRemoved`] for one already claimed.
    pub fn destroy(&self, id: ObjectId) -> Result<Vec<ObjectId>, RegistryError> {
        let _hooks = self.lifecycle.lock();
        let claimed = {
            let created = read(&self.created);
            let mut assigned = write(&self.assigned);
            let mut removed = write(&self.removed);

            let Some(root) = created.get(&id) else {
                return Err(RegistryError::NotRegistered { id });
            };
            if removed.set.contains(&id) {
                return Err(RegistryError::AlreadyRemoved { id });
            }
            if let Some(siblings) = root.owner().and_then(|owner| assigned.get_mut(&owner)) {
                siblings.retain(|child| *child != id);
            }

            let mut claimed: Vec<Arc<SimObject>> = Vec::new();
            let mut stack = vec![Frame::new(id, assigned.remove(&id))];
            loop {
                let next = match stack.last_mut() {
                    Some(frame) => frame.remaining.pop(),
                    None => break,
                };
                if let Some(child) = next {
                    stack.push(Frame::new(child, assigned.remove(&child)));
                } else if let Some(done) = stack.pop() {
                    removed.set.insert(done.id);
                    removed.order.push(done.id);
                    if let Some(object) = created.get(&done.id) {
                        claimed.push(Arc::clone(object));
                    }
                }
            }

            let mut pending = lock(&self.pending);
            pending.retain(|object| !removed.set.contains(&object.id()));
            claimed
        };

        debug!(root = %id, claimed = claimed.len(), "Object subtree destroyed");
        for object in &claimed {
            object.on_end_play();
            object.mark_ended();
        }
        Ok(claimed.iter().map(|object| object.id()).collect())
    }

    /// Release every claimed object whose end-play has returned.
    ///
    /// Objects are erased from storage in reverse claim order (owners
    /// before their descendants) and dropped from the removed set, and
    /// then, with no index lock held, `on_destruction` fires in that same
    /// order. Only the claim-ordered prefix whose `on_end_play` has
    /// completed is released; anything after it stays claimed for the next
    /// call. Returns the number of objects finalized.
    pub fn finalize_removed(&self) -> usize {
        let _hooks = self.lifecycle.lock();
        let finalized: Vec<Arc<SimObject>> = {
            let mut created = write(&self.created);
            let mut removed = write(&self.removed);
            let ready = removed
                .order
                .iter()
                .take_while(|id| created.get(*id).is_none_or(|object| object.has_ended()))
                .count();
            let done: Vec<ObjectId> = removed.order.drain(..ready).collect();
            for id in &done {
                removed.set.remove(id);
            }
            done.iter().rev().filter_map(|id| created.remove(id)).collect()
        };
        if !finalized.is_empty() {
            debug!(finalized = finalized.len(), "Removed objects finalized");
        }
        for object in &finalized {
            object.on_destruction();
        }
        finalized.len()
    }

    /// Whether `id` has not been claimed by a destroy request.
    ///
    /// Takes only a shared lock and is safe from any thread. This answers
    /// whether destroy has logically claimed the object; it says nothing
    /// about storage. After [`finalize_removed`](Self::finalize_removed) a
    /// finalized id is "valid" again but no longer resolves via
    /// [`get`](Self::get), so do not keep a validated id across a cycle
    /// boundary without re-checking.
    pub fn is_valid(&self, id: ObjectId) -> bool {
        !read(&self.removed).set.contains(&id)
    }

    /// Look up a live (stored and unclaimed) object.
    pub fn get(&self, id: ObjectId) -> Option<Arc<SimObject>> {
        let created = read(&self.created);
        let removed = read(&self.removed);
        if removed.set.contains(&id) {
            return None;
        }
        created.get(&id).map(Arc::clone)
    }

    /// Whether `id` resolves to a live object.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Live children of `owner`, in registration order.
    pub fn children(&self, owner: ObjectId) -> Vec<ObjectId> {
        read(&self.assigned).get(&owner).cloned().unwrap_or_default()
    }

    /// Live objects that have been through first-tick dispatch.
    pub fn active_objects(&self) -> Vec<Arc<SimObject>> {
        let created = read(&self.created);
        let removed = read(&self.removed);
        created
            .values()
            .filter(|object| object.has_begun() && !removed.set.contains(&object.id()))
            .map(Arc::clone)
            .collect()
    }

    /// Number of stored objects, including claimed ones not yet finalized.
    pub fn len(&self) -> usize {
        read(&self.created).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        read(&self.created).is_empty()
    }

    /// Number of objects awaiting first-tick dispatch.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Number of claimed objects awaiting finalization.
    pub fn removed_len(&self) -> usize {
        read(&self.removed).order.len()
    }

    /// Snapshot of all index sizes.
    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            registered: self.len(),
            pending: self.pending_len(),
            removed: self.removed_len(),
        }
    }

    /// Destroy every remaining root and finalize everything.
    ///
    /// Each object still receives `on_end_play` and `on_destruction`
    /// exactly once. Returns the number of objects finalized.
    pub fn clear(&self) -> usize {
        let _hooks = self.lifecycle.lock();
        let roots: Vec<ObjectId> = {
            let created = read(&self.created);
            let removed = read(&self.removed);
            created
                .values()
                .filter(|object| object.owner().is_none() && !removed.set.contains(&object.id()))
                .map(|object| object.id())
                .collect()
        };
        for root in roots {
            // A concurrent destroy may have claimed it first.
            if let Err(err) = self.destroy(root) {
                trace!(error = %err, "Root already claimed during clear");
            }
        }
        self.finalize_removed()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
