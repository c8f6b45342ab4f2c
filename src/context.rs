use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use log::debug;
use tokio::runtime::{Builder, Handle, Runtime};

/// How long [QueryContext::shutdown] waits for in-flight work.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Settings for the worker pool behind a [QueryContext].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Number of worker threads. `None` picks twice the available
    /// parallelism, and never fewer than 2.
    pub worker_threads: Option<usize>,
    /// Prefix for worker thread names
    pub thread_name: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            worker_threads: None,
            thread_name: "sourcequery-worker".to_owned(),
        }
    }
}

impl ContextConfig {
    pub fn resolved_worker_threads(&self) -> usize {
        match self.worker_threads {
            Some(n) => n.max(1),
            None => {
                let cores = thread::available_parallelism().map_or(1, |n| n.get());
                (cores * 2).max(2)
            }
        }
    }
}

/// Reactor plus worker pool that every socket, timer and lookup of a
/// query runs on.
///
/// Build one, hand [QueryContext::handle] to as many
/// [SourceQuery](crate::query::SourceQuery) clients as needed, and shut it
/// down when done. Creating or dropping a context from inside an async
/// task is not allowed (tokio forbids nesting runtimes).
#[derive(Debug)]
pub struct QueryContext {
    runtime: Runtime,
    workers: usize,
}

impl QueryContext {
    pub fn new(config: ContextConfig) -> io::Result<Self> {
        let workers = config.resolved_worker_threads();
        let prefix = config.thread_name;
        let counter = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name_fn(move || {
                format!("{prefix}-{}", counter.fetch_add(1, Ordering::Relaxed))
            })
            .enable_io()
            .enable_time()
            .build()?;
        debug!("started query context with {workers} workers");

        Ok(QueryContext { runtime, workers })
    }

    /// Handle to the shared reactor, cheap to clone.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn worker_threads(&self) -> usize {
        self.workers
    }

    /// Stop the reactor and join the workers.
    ///
    /// Queries still in flight resolve with
    /// [SourceQueryError::Cancelled](crate::error::SourceQueryError::Cancelled).
    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(SHUTDOWN_GRACE);
        debug!("query context shut down");
    }
}
