//! psigate - PageSpeed Insights quality gate
//!
//! Scores a list of pages (given directly or expanded from an XML sitemap)
//! through the PageSpeed Insights API and checks the per-category averages
//! against configured thresholds. All API calls go through a rate-limited,
//! retrying request queue so a run stays inside the API quota.
//!
//! # Modules
//!
//! - [`queue`] - Sliding-window request queue with retry and backoff
//! - [`insights`] - PageSpeed Insights client and score types
//! - [`sitemap`] - Sitemap and sitemap index expansion
//! - [`analyzer`] - Fans scoring out through the queue and averages results
//! - [`report`] - Results and terminal rendering
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod insights;
pub mod queue;
pub mod report;
pub mod sitemap;

// Re-export commonly used types
pub use analyzer::Analyzer;
pub use config::{Config, PageSpeedConfig, TargetMode, TargetsConfig, ThresholdsConfig};
pub use insights::{Category, Device, InsightsError, PageSpeedClient, ScoreSource};
pub use queue::{BackoffPolicy, QueueConfig, QueueError, QueueStats, RequestQueue, ResultHandle, RetryPlacement};
pub use report::{CategoryVerdict, PageScores, Report};
pub use sitemap::{HttpSitemapSource, SitemapExpander, SitemapSource, parse_sitemap};
