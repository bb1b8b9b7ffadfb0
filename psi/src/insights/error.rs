//! PageSpeed client error types

use thiserror::Error;

use super::types::Category;

/// Errors that can occur while fetching a score
#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("No {category} score in response")]
    MissingScore { category: Category },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InsightsError {
    /// Quota exhaustion reported by the API
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, InsightsError::Api { code: 429, .. } | InsightsError::Http(429))
    }
}
