//! Request queue error types

use thiserror::Error;

/// Boxed error produced by a task
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the request queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid queue configuration: {0}")]
    Configuration(String),

    #[error("Task failed after {attempts} attempt(s): {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: TaskError,
    },

    #[error("Request dropped before it produced an outcome")]
    Abandoned,
}

impl QueueError {
    /// Number of dispatches made before giving up, if the task ran at all
    pub fn attempts(&self) -> Option<u32> {
        match self {
            QueueError::ExhaustedRetries { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Error used when a task panics instead of returning
#[derive(Debug, Error)]
#[error("Task panicked: {0}")]
pub struct TaskPanicked(pub String);
