use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// A fixed-size pool of worker slots. `submit` enqueues work behind the
/// permit count; `stop` closes the pool and drains in-flight work.
///
/// The scheduler uses exactly two fan-outs per batch (the state gather and
/// the commit), joining both before the batch returns.
pub struct WorkPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    size: usize,
}

impl WorkPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `task` once a worker slot frees up. Resolves to `None` when the
    /// pool was stopped before the task acquired a slot.
    pub fn submit<F>(&self, task: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire().await else {
                return None;
            };
            Some(task.await)
        })
    }

    /// Close the pool and wait for everything already submitted to finish.
    pub async fn stop(&self) {
        self.permits.close();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
