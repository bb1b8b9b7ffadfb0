//! PageSpeed Insights API client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::error::InsightsError;
use super::types::{Category, Device};
use crate::config::PageSpeedConfig;

/// Anything that can score a page for one category
///
/// Implementations are called once per attempt by the request queue, so a
/// call must be safe to repeat.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// Score in `0..=100`
    async fn score(&self, url: &str, category: Category) -> Result<f64, InsightsError>;
}

/// PageSpeed Insights `runPagespeed` client
#[derive(Clone)]
pub struct PageSpeedClient {
    http: Client,
    endpoint: String,
    api_key: String,
    device: Device,
}

impl std::fmt::Debug for PageSpeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSpeedClient")
            .field("endpoint", &self.endpoint)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl PageSpeedClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &PageSpeedConfig) -> eyre::Result<Self> {
        debug!(endpoint = %config.endpoint, device = %config.device, "from_config: called");
        let api_key = config.api_key()?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("psigate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::new(http, &config.endpoint, api_key, config.device))
    }

    pub fn new(http: Client, endpoint: &str, api_key: String, device: Device) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            api_key,
            device,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

#[async_trait]
impl ScoreSource for PageSpeedClient {
    async fn score(&self, url: &str, category: Category) -> Result<f64, InsightsError> {
        debug!(%url, %category, device = %self.device, "PageSpeedClient::score: called");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("url", url),
                ("strategy", self.device.as_str()),
                ("category", category.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, body_len = body.len(), "PageSpeedClient::score: response received");

        parse_score(status, &body, category)
    }
}

#[derive(Debug, Deserialize)]
struct RunPagespeedResponse {
    error: Option<ApiErrorBody>,

    #[serde(rename = "lighthouseResult")]
    lighthouse_result: Option<LighthouseResult>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,

    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    categories: HashMap<String, LighthouseCategory>,
}

#[derive(Debug, Deserialize)]
struct LighthouseCategory {
    score: Option<f64>,
}

/// Extract a category score from a `runPagespeed` response body
///
/// An `error` payload wins over the HTTP status so its message reaches the
/// caller.
pub fn parse_score(status: u16, body: &str, category: Category) -> Result<f64, InsightsError> {
    let parsed: RunPagespeedResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !(200..300).contains(&status) => return Err(InsightsError::Http(status)),
        Err(e) => return Err(e.into()),
    };

    if let Some(error) = parsed.error {
        debug!(code = error.code, message = %error.message, "parse_score: error payload");
        return Err(InsightsError::Api {
            code: if error.code == 0 { status } else { error.code },
            message: error.message,
        });
    }

    if !(200..300).contains(&status) {
        return Err(InsightsError::Http(status));
    }

    parsed
        .lighthouse_result
        .and_then(|result| result.categories.get(category.as_str()).and_then(|c| c.score))
        .map(|score| score * 100.0)
        .ok_or(InsightsError::MissingScore { category })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score() {
        let body = r#"{
            "id": "https://example.com/",
            "lighthouseResult": {
                "categories": {
                    "performance": { "id": "performance", "score": 0.5 },
                    "seo": { "id": "seo", "score": 1 }
                }
            }
        }"#;

        assert_eq!(parse_score(200, body, Category::Performance).unwrap(), 50.0);
        assert_eq!(parse_score(200, body, Category::Seo).unwrap(), 100.0);
    }

    #[test]
    fn test_parse_score_missing_category() {
        let body = r#"{ "lighthouseResult": { "categories": {} } }"#;
        let err = parse_score(200, body, Category::Accessibility).unwrap_err();
        assert!(matches!(
            err,
            InsightsError::MissingScore {
                category: Category::Accessibility
            }
        ));
    }

    #[test]
    fn test_parse_score_null_score() {
        let body = r#"{ "lighthouseResult": { "categories": { "seo": { "score": null } } } }"#;
        assert!(parse_score(200, body, Category::Seo).is_err());
    }

    #[test]
    fn test_error_payload_is_failure() {
        let body = r#"{
            "error": {
                "code": 429,
                "message": "Quota exceeded for quota metric 'Queries'",
                "errors": []
            }
        }"#;
        let err = parse_score(429, body, Category::Performance).unwrap_err();
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[test]
    fn test_error_payload_with_ok_status() {
        let body = r#"{ "error": { "message": "Lighthouse returned error: NO_FCP" } }"#;
        let err = parse_score(200, body, Category::Performance).unwrap_err();
        assert!(matches!(err, InsightsError::Api { code: 200, .. }));
    }

    #[test]
    fn test_non_json_error_status() {
        let err = parse_score(503, "<html>Service Unavailable</html>", Category::Seo).unwrap_err();
        assert!(matches!(err, InsightsError::Http(503)));
    }

    #[test]
    fn test_non_json_ok_status() {
        let err = parse_score(200, "not json", Category::Seo).unwrap_err();
        assert!(matches!(err, InsightsError::Json(_)));
    }
}
