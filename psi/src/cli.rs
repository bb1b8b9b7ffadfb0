//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::insights::Device;

/// psigate - PageSpeed Insights quality gate
#[derive(Debug, Parser)]
#[command(
    name = "psi",
    about = "Check PageSpeed Insights scores against thresholds",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Score pages and fail if any category is below its threshold
    Run {
        /// Page to analyze; repeat for several (overrides configured targets)
        #[arg(short, long = "url", value_name = "URL")]
        urls: Vec<String>,

        /// Sitemap to expand into pages (overrides configured targets)
        #[arg(short, long, conflicts_with = "urls")]
        sitemap: Option<String>,

        /// Device strategy
        #[arg(short, long, value_enum)]
        device: Option<Device>,
    },

    /// Print the pages a run would analyze
    Urls {
        /// Sitemap to expand (defaults to the configured targets)
        #[arg(short, long)]
        sitemap: Option<String>,
    },

    /// Print the effective configuration
    Config,
}
