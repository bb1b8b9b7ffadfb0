//! Request queue implementation

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::join_all;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::backoff::BackoffPolicy;
use super::config::{QueueConfig, RetryPlacement};
use super::error::{QueueError, TaskError, TaskPanicked};
use super::request::{BoxTask, EnqueuedRequest, ResultHandle, completion_pair};
use super::window::{Admission, RateWindow};

/// Counters for the queue
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_succeeded: u64,
    pub total_retried: u64,
    pub total_failed: u64,
    pub peak_queue_depth: usize,
    pub dispatcher_starts: u64,
}

/// Snapshot of queue state
#[derive(Debug, Clone)]
pub struct QueueState {
    pub queued: usize,
    pub in_window: usize,
    pub running: bool,
    pub stats: QueueStats,
}

/// Internal state protected by mutex
struct QueueInner<T> {
    /// Requests waiting for admission, head first
    queue: VecDeque<EnqueuedRequest<T>>,

    /// Dispatch starts inside the trailing window
    window: RateWindow,

    /// Set while a dispatcher loop is alive
    running: bool,

    next_id: u64,

    stats: QueueStats,
}

struct Shared<T> {
    config: QueueConfig,
    backoff: BackoffPolicy,
    inner: Mutex<QueueInner<T>>,
}

/// What the dispatcher should do next
enum Step<T> {
    Idle,
    Wait(std::time::Duration),
    Batch(Vec<EnqueuedRequest<T>>),
}

/// Rate-limited, retrying task queue
///
/// Every submitted task is started through a single dispatcher loop that
/// keeps at most `requests-per-window` starts inside any trailing
/// `window-ms`. Failed tasks are retried with exponential backoff until the
/// retry budget runs out. Cloning the queue yields another handle to the
/// same instance.
pub struct RequestQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> RequestQueue<T> {
    /// Create a new queue with the given configuration
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        debug!(?config, "RequestQueue::new: called");
        let backoff = BackoffPolicy::from_config(&config);
        Self::with_backoff(config, backoff)
    }

    /// Create a queue with an explicit backoff policy
    pub fn with_backoff(config: QueueConfig, backoff: BackoffPolicy) -> Result<Self, QueueError> {
        debug!(?backoff, "RequestQueue::with_backoff: called");
        config.validate()?;

        let window = RateWindow::new(config.requests_per_window, config.window());
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                backoff,
                inner: Mutex::new(QueueInner {
                    queue: VecDeque::new(),
                    window,
                    running: false,
                    next_id: 0,
                    stats: QueueStats::default(),
                }),
            }),
        })
    }

    /// Submit a task and get a handle to its eventual outcome
    ///
    /// The task is called once per attempt, so it must be safe to repeat.
    /// Must be called from within a tokio runtime; the dispatcher is spawned
    /// on demand.
    pub fn submit<F, Fut, E>(&self, task: F) -> ResultHandle<T>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<TaskError> + 'static,
    {
        let task: BoxTask<T> = Box::new(move || task().map(|r| r.map_err(Into::<TaskError>::into)).boxed());
        let (completion, handle) = completion_pair();

        let mut inner = self.shared.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.stats.total_submitted += 1;
        debug!(id, queued = inner.queue.len(), "RequestQueue::submit: called");

        let request = EnqueuedRequest::new(id, task, completion, self.shared.config.max_retries);
        inner.queue.push_back(request);
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.queue.len());
        Shared::ensure_running(&self.shared, &mut inner);

        handle
    }

    /// Get current queue state
    pub fn state(&self) -> QueueState {
        debug!("RequestQueue::state: called");
        let mut inner = self.shared.lock();
        inner.window.prune(Instant::now());

        QueueState {
            queued: inner.queue.len(),
            in_window: inner.window.len(),
            running: inner.running,
            stats: inner.stats.clone(),
        }
    }

    /// Get the queue statistics
    pub fn stats(&self) -> QueueStats {
        debug!("RequestQueue::stats: called");
        self.shared.lock().stats.clone()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }
}

impl<T: Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, QueueInner<T>> {
        // Never held across an await, so a poisoned guard still holds consistent state
        self.inner.lock().unwrap_or_else(|error| error.into_inner())
    }

    /// Spawn the dispatcher unless one is already alive
    fn ensure_running(this: &Arc<Self>, inner: &mut QueueInner<T>) {
        if inner.running {
            debug!("Shared::ensure_running: dispatcher already running");
            return;
        }

        debug!("Shared::ensure_running: spawning dispatcher");
        inner.running = true;
        inner.stats.dispatcher_starts += 1;
        tokio::spawn(Arc::clone(this).dispatch_loop());
    }

    /// Put a request back after a failed attempt
    fn requeue(this: &Arc<Self>, request: EnqueuedRequest<T>) {
        let mut inner = this.lock();
        debug!(id = request.id, placement = ?this.config.retry_placement, "Shared::requeue: called");
        match this.config.retry_placement {
            RetryPlacement::Tail => inner.queue.push_back(request),
            RetryPlacement::Head => inner.queue.push_front(request),
        }
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.queue.len());
        Self::ensure_running(this, &mut inner);
    }

    /// Decide the next dispatcher step under a single lock
    fn next_step(&self) -> Step<T> {
        let mut inner = self.lock();

        if inner.queue.is_empty() {
            // Cleared under the same lock `submit` checks, so no wakeup is lost
            inner.running = false;
            return Step::Idle;
        }

        match inner.window.admission(Instant::now()) {
            Admission::Full(wait) => Step::Wait(wait),
            Admission::Open(available) => {
                let size = available.min(inner.queue.len());
                Step::Batch(inner.queue.drain(..size).collect())
            }
        }
    }

    async fn dispatch_loop(self: Arc<Self>) {
        debug!("Shared::dispatch_loop: started");
        loop {
            match self.next_step() {
                Step::Idle => {
                    debug!("Shared::dispatch_loop: queue empty, stopping");
                    return;
                }
                Step::Wait(wait) => {
                    debug!(?wait, "Shared::dispatch_loop: window full, sleeping");
                    sleep(wait).await;
                }
                Step::Batch(batch) => {
                    debug!(size = batch.len(), "Shared::dispatch_loop: dispatching batch");
                    let members = batch
                        .into_iter()
                        .enumerate()
                        .map(|(index, request)| Arc::clone(&self).dispatch(index, request));
                    join_all(members).await;
                    sleep(self.config.min_dispatch_spacing()).await;
                }
            }
        }
    }

    /// Run one batch member after its stagger delay
    async fn dispatch(self: Arc<Self>, index: usize, mut request: EnqueuedRequest<T>) {
        sleep(self.config.stagger(index)).await;

        {
            let mut inner = self.lock();
            inner.window.record(Instant::now());
            inner.stats.total_dispatched += 1;
        }
        request.attempts += 1;
        debug!(id = request.id, attempt = request.attempts, index, "Shared::dispatch: starting task");

        // Panics while building the future or while polling it both count as failures
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| (request.task)())) {
            Ok(attempt) => AssertUnwindSafe(attempt)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panicked(panic))),
            Err(panic) => Err(panicked(panic)),
        };

        match outcome {
            Ok(value) => {
                debug!(id = request.id, "Shared::dispatch: task succeeded");
                self.lock().stats.total_succeeded += 1;
                request.completion.resolve(value);
            }
            Err(error) => self.retry_or_reject(request, error),
        }
    }

    /// Schedule another attempt, or deliver the terminal failure
    fn retry_or_reject(self: Arc<Self>, mut request: EnqueuedRequest<T>, error: TaskError) {
        if request.attempts_remaining == 0 {
            warn!(id = request.id, attempts = request.attempts, %error, "Task failed, no retries remaining");
            self.lock().stats.total_failed += 1;
            request.completion.reject(QueueError::ExhaustedRetries {
                attempts: request.attempts,
                source: error,
            });
            return;
        }

        let attempt = self.config.max_retries.saturating_sub(request.attempts_remaining);
        let delay = self.backoff.delay(attempt);
        request.attempts_remaining -= 1;
        self.lock().stats.total_retried += 1;
        warn!(
            id = request.id,
            %error,
            ?delay,
            attempts_remaining = request.attempts_remaining,
            "Task failed, retrying"
        );

        tokio::spawn(async move {
            sleep(delay).await;
            Shared::requeue(&self, request);
        });
    }
}

fn panicked(panic: Box<dyn std::any::Any + Send>) -> TaskError {
    let message = if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    };
    Box::new(TaskPanicked(message))
}
