//! At-least-once work queue
//!
//! A single worker drains an unbounded channel in submission order. Failed
//! tasks are redelivered whole after an exponential backoff with random
//! jitter. Redelivery is not deduplicated: a decay task that failed after
//! some of its writes landed applies those writes again.

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{RuntimeConfig, Task, TaskEnvelope, TaskError};

/// Executes tasks delivered by the queue
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}

struct QueueState {
    sender: mpsc::UnboundedSender<TaskEnvelope>,
    /// Submitted tasks that have neither succeeded nor been dropped
    pending: AtomicUsize,
    idle: Notify,
}

impl QueueState {
    fn enqueue(self: &Arc<Self>, envelope: TaskEnvelope, delay: Duration) {
        if delay.is_zero() {
            self.send(envelope);
            return;
        }
        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.send(envelope);
        });
    }

    fn send(&self, envelope: TaskEnvelope) {
        if let Err(e) = self.sender.send(envelope) {
            warn!("Work queue closed, dropping task {}", e.0.id);
            self.finish();
        }
    }

    fn finish(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Work queue with one background worker
pub struct WorkQueue {
    state: Arc<QueueState>,
    worker: JoinHandle<()>,
}

impl WorkQueue {
    /// Start the worker; must be called inside a tokio runtime
    pub fn start(handler: Arc<dyn TaskHandler>, config: RuntimeConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState {
            sender,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        let worker = tokio::spawn(run_worker(handler, receiver, state.clone(), config));
        Self { state, worker }
    }

    pub fn submit(&self, task: Task) -> Uuid {
        self.submit_after(task, Duration::ZERO)
    }

    /// Deliver `task` once `delay` has passed
    pub fn submit_after(&self, task: Task, delay: Duration) -> Uuid {
        let envelope = TaskEnvelope::new(task);
        let id = envelope.id;
        debug!("Queued {} as {}", envelope.task, id);
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        self.state.enqueue(envelope, delay);
        id
    }

    /// Tasks submitted but not yet finished, delayed ones included
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Wait until every submitted task has finished
    pub async fn drain(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    handler: Arc<dyn TaskHandler>,
    mut receiver: mpsc::UnboundedReceiver<TaskEnvelope>,
    state: Arc<QueueState>,
    config: RuntimeConfig,
) {
    while let Some(envelope) = receiver.recv().await {
        match handler.handle(&envelope.task).await {
            Ok(()) => {
                debug!("Finished {} ({})", envelope.task, envelope.id);
                state.finish();
            }
            Err(e) if e.is_transient() && envelope.attempt + 1 < config.max_attempts => {
                let delay = retry_delay(&config, envelope.attempt);
                warn!(
                    "{} failed on attempt {}, retrying in {:?}: {}",
                    envelope.task,
                    envelope.attempt + 1,
                    delay,
                    e
                );
                state.enqueue(envelope.retry(), delay);
            }
            Err(e) => {
                error!(
                    "Dropping {} ({}) after {} attempts: {}",
                    envelope.task,
                    envelope.id,
                    envelope.attempt + 1,
                    e
                );
                state.finish();
            }
        }
    }
}

/// Backoff before redelivering a task that failed on `attempt`
pub fn retry_delay(config: &RuntimeConfig, attempt: u32) -> Duration {
    let backoff = config
        .retry_backoff_ms
        .saturating_mul(1u64 << attempt.min(10));
    let jitter = if config.retry_jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.retry_jitter_ms)
    } else {
        0
    };
    Duration::from_millis(backoff.saturating_add(jitter))
}
