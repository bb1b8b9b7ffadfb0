//! Rate-limited request queue
//!
//! Every outbound PageSpeed call goes through a [`RequestQueue`]. It admits
//! work through a sliding rate window, staggers the starts of each admitted
//! batch, and retries failures with exponential backoff and jitter.

mod backoff;
mod config;
mod core;
mod error;
mod request;
mod window;

pub use backoff::{BackoffPolicy, DEFAULT_JITTER_SPREAD};
pub use config::{QueueConfig, RetryPlacement};
pub use self::core::{QueueState, QueueStats, RequestQueue};
pub use error::{QueueError, TaskError, TaskPanicked};
pub use request::ResultHandle;
pub use window::{Admission, RateWindow};
