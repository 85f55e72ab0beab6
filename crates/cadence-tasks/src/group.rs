//! Task groups: an ordered composite of nodes plus a trailing hook.
//!
//! A group is itself a [`TaskNode`]. When it runs it wires its children
//! (serially, or all in parallel), hands its own successors and done hooks
//! to the hook node, and submits the first runnable element. From the
//! outside the group therefore completes exactly when its hook completes.

use std::sync::Arc;

use tracing::trace;

use crate::error::TaskError;
use crate::sink::WorkerSink;
use crate::task::{Body, TaskNode, TaskRef};

/// How a group wires its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrder {
    /// `child[i]` is the sole predecessor of `child[i + 1]`; the last child
    /// precedes the hook.
    Serial,
    /// Every child precedes the hook and may run concurrently with its
    /// siblings.
    Parallel,
}

/// Children and hook of a group node, consumed when the group runs.
pub(crate) struct GroupParts {
    order: GroupOrder,
    children: Vec<TaskRef>,
    hook: Option<TaskRef>,
}

impl GroupParts {
    fn contains(&self, task: &TaskRef) -> bool {
        self.children.iter().any(|child| Arc::ptr_eq(child, task))
            || self.hook.as_ref().is_some_and(|hook| Arc::ptr_eq(hook, task))
    }

    /// Wire children to the hook and submit the entry points.
    ///
    /// On error nothing is submitted and the group keeps its own successors
    /// and done hooks, so the caller can still complete it.
    pub(crate) fn expand(self, group: &TaskRef, sink: &dyn WorkerSink) -> Result<(), TaskError> {
        let hook = self
            .hook
            .unwrap_or_else(|| TaskNode::empty(format!("{}.hook", group.label())));

        for node in self.children.iter().chain(core::iter::once(&hook)) {
            if node.has_started() {
                return Err(TaskError::AlreadyStarted {
                    label: node.label().to_owned(),
                });
            }
        }

        match self.order {
            GroupOrder::Serial => {
                for pair in self.children.windows(2) {
                    if let [current, next] = pair {
                        current.connect(next)?;
                    }
                }
                if let Some(last) = self.children.last() {
                    last.connect(&hook)?;
                }
            }
            GroupOrder::Parallel => {
                // Every edge exists before any child is submitted, so the
                // hook cannot be released early by a fast child.
                for child in &self.children {
                    child.connect(&hook)?;
                }
            }
        }

        // Wiring succeeded: from here on the hook completes for the group.
        group.hand_off_completion(&hook);
        trace!(
            group = %group.label(),
            order = ?self.order,
            children = self.children.len(),
            "Group wired"
        );

        if self.children.is_empty() {
            sink.submit(hook);
            return Ok(());
        }
        match self.order {
            GroupOrder::Serial => {
                if let Some(first) = self.children.into_iter().next() {
                    sink.submit(first);
                }
            }
            GroupOrder::Parallel => {
                for child in self.children {
                    sink.submit(child);
                }
            }
        }
        Ok(())
    }
}

/// An ordered composite of task nodes with a trailing hook node.
///
/// Children and the hook must be supplied before the group is submitted.
/// Without an explicit hook an empty one is created when the group runs.
#[derive(Debug, Clone)]
pub struct TaskGroup {
    node: TaskRef,
}

impl TaskGroup {
    /// Create an empty group whose children run one after another.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_order(label, GroupOrder::Serial)
    }

    /// Create an empty group whose children may run concurrently.
    pub fn parallel(label: impl Into<String>) -> Self {
        Self::with_order(label, GroupOrder::Parallel)
    }

    fn with_order(label: impl Into<String>, order: GroupOrder) -> Self {
        let parts = GroupParts {
            order,
            children: Vec::new(),
            hook: None,
        };
        Self {
            node: TaskNode::with_body(label, Body::Group(parts)),
        }
    }

    /// Append a child.
    ///
    /// # Errors
    ///
    /// [`TaskError::AlreadyStarted`] once the group (or `task`) has started,
    /// and [`TaskError::DuplicateChild`] if `task` is already a member.
    pub fn add(&self, task: TaskRef) -> Result<(), TaskError> {
        let group = self.node.label().to_owned();
        self.node.with_group_parts(|parts| {
            if parts.contains(&task) {
                return Err(TaskError::DuplicateChild {
                    group,
                    child: task.label().to_owned(),
                });
            }
            if task.has_started() {
                return Err(TaskError::AlreadyStarted {
                    label: task.label().to_owned(),
                });
            }
            parts.children.push(task);
            Ok(())
        })
    }

    /// Designate the trailing hook node, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Same conditions as [`add`](Self::add).
    pub fn set_hook(&self, task: TaskRef) -> Result<(), TaskError> {
        let group = self.node.label().to_owned();
        self.node.with_group_parts(|parts| {
            if parts.children.iter().any(|child| Arc::ptr_eq(child, &task)) {
                return Err(TaskError::DuplicateChild {
                    group,
                    child: task.label().to_owned(),
                });
            }
            if task.has_started() {
                return Err(TaskError::AlreadyStarted {
                    label: task.label().to_owned(),
                });
            }
            parts.hook = Some(task);
            Ok(())
        })
    }

    /// Number of children added so far (the hook is not counted).
    pub fn len(&self) -> usize {
        self.node
            .with_group_parts(|parts| Ok(parts.children.len()))
            .unwrap_or(0)
    }

    /// Whether no children have been added.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `successor` depend on the whole group.
    ///
    /// # Errors
    ///
    /// See [`TaskNode::connect`].
    pub fn connect(&self, successor: &TaskRef) -> Result<(), TaskError> {
        self.node.connect(successor)
    }

    /// The node that represents this group in a graph.
    pub const fn node(&self) -> &TaskRef {
        &self.node
    }

    /// Consume the group, returning its node.
    pub fn into_node(self) -> TaskRef {
        self.node
    }
}

impl From<TaskGroup> for TaskRef {
    fn from(group: TaskGroup) -> Self {
        group.node
    }
}
