//! Single-consumer background task queue.
//!
//! One worker task drains the queue in FIFO order, so everything enqueued
//! here (live-view updates, deferred deliveries) executes strictly in
//! submission order and never inside a writer's critical section.

use crate::storage_trait::{Result, StoreError};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Task {
    label: String,
    future: TaskFuture,
}

/// FIFO queue with a single worker task.
pub struct TaskQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Creates the queue and spawns its worker. Must run inside a tokio
    /// runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        let worker = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                log::trace!("queue: running task '{}'", task.label);
                task.future.await;
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            log::debug!("queue: worker stopped");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            pending,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueues a task. Fails with [`StoreError::QueueClosed`] after
    /// [`TaskQueue::close`].
    pub fn enqueue<F>(&self, label: impl Into<String>, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(StoreError::QueueClosed);
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx
            .send(Task {
                label,
                future: Box::pin(future),
            })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::QueueClosed);
        }
        Ok(())
    }

    /// Number of tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until every submitted task has finished.
    pub async fn wait_idle(&self) {
        while self.pending() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Drains outstanding tasks and stops the worker.
    pub async fn close(&self) {
        let tx = self.tx.lock().take();
        drop(tx);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                log::error!("queue: worker join failed: {}", err);
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
