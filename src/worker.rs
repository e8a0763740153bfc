//! Injectable worker pool for handler offload.
//!
//! Inbound dispatch bookkeeping runs one message at a time; handler bodies
//! are offloaded here so a slow handler never blocks the transport
//! read/write path. Production code injects [`TokioPool`]; tests inject
//! [`DeterministicPool`] and drive queued work explicitly for deterministic
//! ordering.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;

/// Executor seam for offloaded handler work.
pub trait WorkerPool: Send + Sync {
    /// Submit one unit of work for execution.
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Pool backed by the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPool;

impl WorkerPool for TokioPool {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

/// Queueing pool for tests: work runs only when the test drains it.
#[derive(Default)]
pub struct DeterministicPool {
    queue: Mutex<VecDeque<BoxFuture<'static, ()>>>,
}

impl DeterministicPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued, not-yet-run tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every queued task to completion, in submission order.
    ///
    /// Tasks spawned while draining are run too.
    pub async fn run_all(&self) {
        loop {
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match next {
                Some(task) => task.await,
                None => break,
            }
        }
    }
}

impl WorkerPool for DeterministicPool {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }
}
