//! Error types for the `cadence-tasks` crate.

/// Precondition violations detected while building or running a task graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// An edge was added after one of its endpoints started running.
    #[error("cannot connect {from} -> {to}: execution already started")]
    EdgeAfterStart {
        /// Label of the predecessor.
        from: String,
        /// Label of the successor.
        to: String,
    },

    /// A node was connected to itself.
    #[error("task {label} cannot depend on itself")]
    SelfEdge {
        /// Label of the offending node.
        label: String,
    },

    /// A node was run, modified, or adopted by a group after it started.
    #[error("task {label} has already started")]
    AlreadyStarted {
        /// Label of the offending node.
        label: String,
    },

    /// A node was run while predecessors were still outstanding.
    #[error("task {label} is not ready ({incoming} predecessors outstanding)")]
    NotReady {
        /// Label of the offending node.
        label: String,
        /// Number of predecessors that have not completed.
        incoming: usize,
    },

    /// The same node was added to a group twice, or used as both a child
    /// and the hook.
    #[error("task {child} is already part of group {group}")]
    DuplicateChild {
        /// Label of the group.
        group: String,
        /// Label of the duplicated node.
        child: String,
    },

    /// A group operation was applied to a plain node.
    #[error("task {label} is not a group")]
    NotAGroup {
        /// Label of the offending node.
        label: String,
    },
}

/// Failure reported by a task body.
///
/// A failing body never stops the graph: the failure is logged, the node's
/// completion hooks fire, and its successors are released as usual.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    /// Create a failure with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while configuring a worker sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The rayon thread pool could not be built.
    #[error("failed to build worker pool: {source}")]
    PoolBuild {
        /// The underlying rayon error.
        #[from]
        source: rayon::ThreadPoolBuildError,
    },
}
