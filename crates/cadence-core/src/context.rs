//! Scoped per-thread world context and typed initializer stack.
//!
//! Code running inside a tick handler or a lifecycle hook can ask which
//! world it belongs to with [`current`], without a process-wide global.
//! The context is pushed by a [`ContextGuard`] and popped when the guard
//! drops, on every exit path including unwinding.
//!
//! Object construction can receive out-of-band parameters through the
//! initializer stack: [`World::spawn_with`] pushes a typed value for the
//! duration of the build closure, and the closure reads it back with
//! [`top_initializer`]. An empty stack and a value of the wrong type are
//! reported as distinct errors.
//!
//! [`World::spawn_with`]: crate::world::World::spawn_with

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::world::World;

/// Errors raised by initializer stack lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// No initializer is pushed on this thread.
    #[error("initializer stack is empty")]
    EmptyStack,

    /// The top initializer is not of the requested type.
    #[error("top initializer is not a {expected}")]
    TypeMismatch {
        /// Name of the requested type.
        expected: &'static str,
    },
}

/// Identity of the world a thread is currently working for.
#[derive(Debug)]
pub struct WorldContext {
    name: String,
    world: Weak<World>,
}

impl WorldContext {
    /// Create a context for `world`.
    pub fn new(name: impl Into<String>, world: Weak<World>) -> Self {
        Self {
            name: name.into(),
            world,
        }
    }

    /// Name of the world.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The world, if it is still alive.
    pub fn world(&self) -> Option<Arc<World>> {
        self.world.upgrade()
    }
}

thread_local! {
    static CONTEXTS: RefCell<Vec<Arc<WorldContext>>> = const { RefCell::new(Vec::new()) };
    static INITIALIZERS: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
}

/// The innermost context entered on this thread.
pub fn current() -> Option<Arc<WorldContext>> {
    CONTEXTS.with(|stack| stack.borrow().last().map(Arc::clone))
}

/// Number of contexts entered on this thread.
pub fn depth() -> usize {
    CONTEXTS.with(|stack| stack.borrow().len())
}

/// Keeps a context entered until dropped. Bound to the entering thread.
#[derive(Debug)]
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Enter `context` on this thread.
    pub fn enter(context: Arc<WorldContext>) -> Self {
        CONTEXTS.with(|stack| stack.borrow_mut().push(context));
        Self {
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let popped = CONTEXTS.with(|stack| stack.borrow_mut().pop());
        drop(popped);
    }
}

/// Keeps an initializer pushed until dropped. Bound to the pushing thread.
#[derive(Debug)]
#[must_use = "the initializer is popped as soon as the guard is dropped"]
pub struct InitializerGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl InitializerGuard {
    /// Push `value` onto this thread's initializer stack.
    pub fn push<T: Any>(value: T) -> Self {
        INITIALIZERS.with(|stack| stack.borrow_mut().push(Box::new(value)));
        Self {
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for InitializerGuard {
    fn drop(&mut self) {
        // Dropped outside the borrow: the value's own drop may push.
        let popped = INITIALIZERS.with(|stack| stack.borrow_mut().pop());
        drop(popped);
    }
}

/// A copy of the top initializer on this thread.
///
/// # Errors
///
/// [`ContextError::EmptyStack`] if nothing is pushed, and
/// [`ContextError::TypeMismatch`] if the top value is not a `T`. Entries
/// below the top are never consulted.
pub fn top_initializer<T: Any + Clone>() -> Result<T, ContextError> {
    INITIALIZERS.with(|stack| {
        let stack = stack.borrow();
        let top = stack.last().ok_or(ContextError::EmptyStack)?;
        top.downcast_ref::<T>()
            .cloned()
            .ok_or(ContextError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })
    })
}
