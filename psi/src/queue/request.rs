//! Request types for the queue

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use super::error::{QueueError, TaskError};

/// A retryable unit of work: every call produces a fresh attempt
pub type BoxTask<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, TaskError>> + Send + 'static>;

/// Sending half of a result handle
///
/// Both `resolve` and `reject` consume the completion, so a request can
/// deliver at most one outcome.
pub struct Completion<T> {
    tx: oneshot::Sender<Result<T, QueueError>>,
}

impl<T> Completion<T> {
    pub fn resolve(self, value: T) {
        if self.tx.send(Ok(value)).is_err() {
            debug!("Completion::resolve: result handle dropped");
        }
    }

    pub fn reject(self, error: QueueError) {
        if self.tx.send(Err(error)).is_err() {
            debug!("Completion::reject: result handle dropped");
        }
    }
}

/// Single-fulfillment handle returned by `RequestQueue::submit`
///
/// Resolves to the task's value, or to the error that ended its retries.
/// Dropping the handle does not cancel the request.
#[must_use = "a result handle does nothing unless awaited"]
pub struct ResultHandle<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Future for ResultHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a linked completion / result handle pair
pub fn completion_pair<T>() -> (Completion<T>, ResultHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (Completion { tx }, ResultHandle { rx })
}

/// A task waiting in (or travelling through) the queue
pub struct EnqueuedRequest<T> {
    /// Per-queue sequence number, for log correlation
    pub id: u64,
    pub task: BoxTask<T>,
    pub completion: Completion<T>,
    pub attempts_remaining: u32,
    /// Dispatches made so far
    pub attempts: u32,
    pub enqueued_at: Instant,
}

impl<T> EnqueuedRequest<T> {
    pub fn new(id: u64, task: BoxTask<T>, completion: Completion<T>, max_retries: u32) -> Self {
        Self {
            id,
            task,
            completion,
            attempts_remaining: max_retries,
            attempts: 0,
            enqueued_at: Instant::now(),
        }
    }
}

impl<T> std::fmt::Debug for EnqueuedRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueuedRequest")
            .field("id", &self.id)
            .field("attempts_remaining", &self.attempts_remaining)
            .field("attempts", &self.attempts)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}
