//! psigate configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::insights::{Category, Device};
use crate::queue::QueueConfig;

/// Main psigate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// PageSpeed Insights API configuration
    pub pagespeed: PageSpeedConfig,

    /// Which pages to analyze
    pub targets: TargetsConfig,

    /// Minimum average score per category
    pub thresholds: ThresholdsConfig,

    /// Request queue pacing and retries
    pub queue: QueueConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks the API key, the target mode and the thresholds so a run fails
    /// before any request is made.
    pub fn validate(&self) -> Result<()> {
        self.pagespeed.api_key()?;
        self.targets.validate()?;
        self.queue.validate()?;

        if self.thresholds.categories().is_empty() {
            return Err(eyre!("No thresholds configured; set at least one of performance, accessibility, best-practices, seo"));
        }
        for (category, threshold) in self.thresholds.iter() {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(eyre!("{} threshold {} is outside 0..=100", category, threshold));
            }
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .psigate.yml
        let local_config = PathBuf::from(".psigate.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/psigate/psigate.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("psigate").join("psigate.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".psigate.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("psigate").join("psigate.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// PageSpeed Insights API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSpeedConfig {
    /// runPagespeed endpoint
    pub endpoint: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Device strategy
    pub device: Device,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Upstream quota; when set it overrides the queue's rate settings
    #[serde(rename = "quota-per-minute", skip_serializing_if = "Option::is_none")]
    pub quota_per_minute: Option<u32>,
}

impl Default for PageSpeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://pagespeedonline.googleapis.com/pagespeedonline/v5/runPagespeed".to_string(),
            api_key_env: "PAGESPEED_API_KEY".to_string(),
            device: Device::Mobile,
            timeout_ms: 120_000,
            quota_per_minute: None,
        }
    }
}

impl PageSpeedConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(eyre!(
                "PageSpeed API key not found. Set the {} environment variable.",
                self.api_key_env
            )),
        }
    }
}

/// How the page list is produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// Use `urls` as given
    #[default]
    UrlList,

    /// Expand `sitemap-url`
    Sitemap,
}

/// Pages to analyze
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub mode: TargetMode,

    /// Page URLs for `url-list` mode
    pub urls: Vec<String>,

    /// Root sitemap for `sitemap` mode
    #[serde(rename = "sitemap-url", skip_serializing_if = "Option::is_none")]
    pub sitemap_url: Option<String>,
}

impl TargetsConfig {
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            TargetMode::UrlList if self.urls.is_empty() => Err(eyre!("urls is required when mode is url-list")),
            TargetMode::Sitemap if self.sitemap_url.is_none() => {
                Err(eyre!("sitemap-url is required when mode is sitemap"))
            }
            _ => Ok(()),
        }
    }
}

/// Minimum average score per category; unset categories are not queried
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<f64>,

    #[serde(rename = "best-practices", skip_serializing_if = "Option::is_none")]
    pub best_practices: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo: Option<f64>,
}

impl ThresholdsConfig {
    pub fn get(&self, category: Category) -> Option<f64> {
        match category {
            Category::Performance => self.performance,
            Category::Accessibility => self.accessibility,
            Category::BestPractices => self.best_practices,
            Category::Seo => self.seo,
        }
    }

    /// Configured (category, threshold) pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.into_iter().filter_map(|c| self.get(c).map(|t| (c, t)))
    }

    /// Categories that have a threshold
    pub fn categories(&self) -> Vec<Category> {
        self.iter().map(|(c, _)| c).collect()
    }
}
