//! PageSpeed Insights scoring
//!
//! Provides the HTTP client and the [`ScoreSource`] seam the analyzer
//! builds its queue tasks on.

mod client;
mod error;
mod types;

pub use client::{PageSpeedClient, ScoreSource, parse_score};
pub use error::InsightsError;
pub use types::{Category, Device};
