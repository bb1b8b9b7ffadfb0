//! psi - PageSpeed Insights quality gate
//!
//! CLI entry point for scoring pages and checking thresholds.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use psigate::analyzer::Analyzer;
use psigate::cli::{Cli, Command};
use psigate::config::{Config, TargetMode, TargetsConfig};
use psigate::insights::PageSpeedClient;
use psigate::queue::{QueueConfig, RequestQueue};
use psigate::sitemap::{HttpSitemapSource, SitemapExpander};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // stdout carries the report; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

    debug!(?level, "Logging initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { urls, sitemap, device } => {
            apply_target_overrides(&mut config.targets, urls, sitemap);
            if let Some(device) = device {
                config.pagespeed.device = device;
            }
            cmd_run(config).await
        }
        Command::Urls { sitemap } => {
            apply_target_overrides(&mut config.targets, Vec::new(), sitemap);
            cmd_urls(&config).await
        }
        Command::Config => cmd_config(&config),
    }
}

/// Command-line targets replace the configured ones
fn apply_target_overrides(targets: &mut TargetsConfig, urls: Vec<String>, sitemap: Option<String>) {
    if !urls.is_empty() {
        debug!(count = urls.len(), "apply_target_overrides: using --url list");
        targets.mode = TargetMode::UrlList;
        targets.urls = urls;
    } else if let Some(sitemap) = sitemap {
        debug!(%sitemap, "apply_target_overrides: using --sitemap");
        targets.mode = TargetMode::Sitemap;
        targets.sitemap_url = Some(sitemap);
    }
}

/// Queue settings, with a configured quota replacing the rate fields
fn queue_config(config: &Config) -> Result<QueueConfig> {
    let mut queue = config.queue.clone();
    if let Some(quota) = config.pagespeed.quota_per_minute {
        let derived = QueueConfig::from_quota_per_minute(quota)?;
        info!(
            quota,
            requests_per_window = derived.requests_per_window,
            window_ms = derived.window_ms,
            "Deriving queue rate from quota"
        );
        queue.requests_per_window = derived.requests_per_window;
        queue.window_ms = derived.window_ms;
    }
    Ok(queue)
}

async fn resolve_urls(config: &Config) -> Result<Vec<String>> {
    match config.targets.mode {
        TargetMode::UrlList => Ok(config.targets.urls.clone()),
        TargetMode::Sitemap => {
            let root = config
                .targets
                .sitemap_url
                .as_deref()
                .ok_or_else(|| eyre!("sitemap-url is required when mode is sitemap"))?;
            let source = HttpSitemapSource::new(Duration::from_millis(config.pagespeed.timeout_ms))?;
            SitemapExpander::new(source)
                .expand(root)
                .await
                .context(format!("Failed to expand sitemap {}", root))
        }
    }
}

async fn cmd_run(mut config: Config) -> Result<()> {
    config.queue = queue_config(&config)?;
    config.validate().context("Invalid configuration")?;

    let urls = resolve_urls(&config).await?;
    info!(pages = urls.len(), device = %config.pagespeed.device, "Starting analysis");

    let client = PageSpeedClient::from_config(&config.pagespeed)?;
    let queue = RequestQueue::new(config.queue.clone())?;
    let analyzer = Analyzer::new(Arc::new(client), queue, config.thresholds.clone());

    let report = analyzer.run(&urls).await?;
    print!("{}", report.render());

    let stats = analyzer.queue().stats();
    debug!(?stats, "cmd_run: queue stats");

    if report.passed() {
        Ok(())
    } else {
        let failed: Vec<_> = report.failures().map(|v| v.category.label()).collect();
        Err(eyre!("Score below threshold: {}", failed.join(", ")))
    }
}

async fn cmd_urls(config: &Config) -> Result<()> {
    config.targets.validate()?;
    for url in resolve_urls(config).await? {
        println!("{}", url);
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
