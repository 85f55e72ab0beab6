//! Worker pool configuration.

use serde::{Deserialize, Serialize};

/// Concurrency parameters handed to [`WorkerSink::configure`].
///
/// [`WorkerSink::configure`]: crate::WorkerSink::configure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadingConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,

    /// Prefix for worker thread names (`<prefix>-<index>`).
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name: default_thread_name(),
        }
    }
}

impl ThreadingConfig {
    /// Resolve the worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }
}

fn default_thread_name() -> String {
    "cadence-worker".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_resolves_to_parallelism() {
        let mut config = ThreadingConfig::default();
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 3;
        assert_eq!(config.resolved_worker_threads(), 3);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: Result<ThreadingConfig, _> = serde_yml::from_str("worker_threads: 2\n");
        let config = config.ok().unwrap_or_default();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.thread_name, "cadence-worker");
    }
}
