//! Score collection and threshold checks
//!
//! The analyzer fans every (page, category) pair out through the request
//! queue, waits for all of them, then averages per category and compares the
//! averages with the configured thresholds.

use std::sync::Arc;

use eyre::{Context, Result, eyre};
use futures::future::join_all;
use tracing::{debug, info};

use crate::config::ThresholdsConfig;
use crate::insights::{Category, ScoreSource};
use crate::queue::RequestQueue;
use crate::report::{CategoryVerdict, PageScores, Report};

/// Scores pages through a shared request queue
pub struct Analyzer {
    source: Arc<dyn ScoreSource>,
    queue: RequestQueue<f64>,
    thresholds: ThresholdsConfig,
}

impl Analyzer {
    pub fn new(source: Arc<dyn ScoreSource>, queue: RequestQueue<f64>, thresholds: ThresholdsConfig) -> Self {
        Self {
            source,
            queue,
            thresholds,
        }
    }

    pub fn queue(&self) -> &RequestQueue<f64> {
        &self.queue
    }

    /// Score every page and check the averages
    pub async fn run(&self, urls: &[String]) -> Result<Report> {
        debug!(pages = urls.len(), "Analyzer::run: called");
        if urls.is_empty() {
            return Err(eyre!("No URLs to analyze"));
        }

        let categories = self.thresholds.categories();
        if categories.is_empty() {
            return Err(eyre!("No thresholds configured, nothing to check"));
        }

        info!(
            pages = urls.len(),
            categories = categories.len(),
            requests = urls.len() * categories.len(),
            "Submitting score requests"
        );

        // Submit everything up front so the queue can pace the whole run
        let mut pending = Vec::with_capacity(urls.len() * categories.len());
        for url in urls {
            for &category in &categories {
                let handle = self.submit_score(url, category);
                pending.push((url, category, handle));
            }
        }

        let (keys, handles): (Vec<_>, Vec<_>) = pending.into_iter().map(|(u, c, h)| ((u, c), h)).unzip();
        let outcomes = join_all(handles).await;

        let mut pages: Vec<PageScores> = urls.iter().map(|u| PageScores::new(u.clone())).collect();
        for (index, ((url, category), outcome)) in keys.into_iter().zip(outcomes).enumerate() {
            let score = outcome.context(format!("Failed to score {} for {}", category, url))?;
            debug!(%url, %category, score, "Analyzer::run: score received");
            pages[index / categories.len()].scores.push((category, score));
        }

        let verdicts = categories
            .iter()
            .map(|&category| {
                let average = average_for(&pages, category);
                let threshold = self.thresholds.get(category).unwrap_or_default();
                CategoryVerdict {
                    category,
                    average,
                    threshold,
                    passed: average >= threshold,
                }
            })
            .collect();

        let report = Report { pages, verdicts };
        info!(passed = report.passed(), "Analysis complete");
        Ok(report)
    }

    fn submit_score(&self, url: &str, category: Category) -> crate::queue::ResultHandle<f64> {
        let source = Arc::clone(&self.source);
        let url = url.to_string();
        self.queue.submit(move || {
            let source = Arc::clone(&source);
            let url = url.clone();
            async move {
                debug!(%url, %category, "Analyzer: checking score");
                source.score(&url, category).await
            }
        })
    }
}

/// Mean score for `category`, rounded to two decimals
fn average_for(pages: &[PageScores], category: Category) -> f64 {
    let scores: Vec<f64> = pages.iter().filter_map(|p| p.score(category)).collect();
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::InsightsError;
    use crate::queue::QueueConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fixed scores, with optional failures before success per key
    struct FakeSource {
        scores: HashMap<(String, Category), f64>,
        failures_left: Mutex<HashMap<(String, Category), u32>>,
    }

    impl FakeSource {
        fn new(scores: &[(&str, Category, f64)]) -> Self {
            Self {
                scores: scores.iter().map(|(u, c, s)| ((u.to_string(), *c), *s)).collect(),
                failures_left: Mutex::new(HashMap::new()),
            }
        }

        fn failing(self, url: &str, category: Category, times: u32) -> Self {
            self.failures_left
                .lock()
                .unwrap()
                .insert((url.to_string(), category), times);
            self
        }
    }

    #[async_trait]
    impl ScoreSource for FakeSource {
        async fn score(&self, url: &str, category: Category) -> Result<f64, InsightsError> {
            let key = (url.to_string(), category);
            {
                let mut failures = self.failures_left.lock().unwrap();
                if let Some(left) = failures.get_mut(&key)
                    && *left > 0
                {
                    *left -= 1;
                    return Err(InsightsError::Api {
                        code: 500,
                        message: "backend error".to_string(),
                    });
                }
            }
            self.scores
                .get(&key)
                .copied()
                .ok_or(InsightsError::MissingScore { category })
        }
    }

    fn queue() -> RequestQueue<f64> {
        RequestQueue::new(QueueConfig {
            requests_per_window: 4,
            max_retries: 2,
            base_backoff_ms: 10,
            max_backoff_ms: 100,
            ..Default::default()
        })
        .unwrap()
    }

    fn thresholds(performance: Option<f64>, seo: Option<f64>) -> ThresholdsConfig {
        ThresholdsConfig {
            performance,
            seo,
            ..Default::default()
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_averages_and_verdicts() {
        let source = FakeSource::new(&[
            ("a", Category::Performance, 90.0),
            ("b", Category::Performance, 71.0),
            ("a", Category::Seo, 100.0),
            ("b", Category::Seo, 80.0),
        ]);
        let analyzer = Analyzer::new(Arc::new(source), queue(), thresholds(Some(85.0), Some(90.0)));

        let report = analyzer.run(&urls(&["a", "b"])).await.unwrap();

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[1].score(Category::Seo), Some(80.0));

        let perf = report.verdict(Category::Performance).unwrap();
        assert_eq!(perf.average, 80.5);
        assert!(!perf.passed);

        let seo = report.verdict(Category::Seo).unwrap();
        assert_eq!(seo.average, 90.0);
        assert!(seo.passed);

        assert!(!report.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_thresholded_categories_are_queried() {
        let source = FakeSource::new(&[("a", Category::Seo, 99.0)]);
        let analyzer = Analyzer::new(Arc::new(source), queue(), thresholds(None, Some(50.0)));

        let report = analyzer.run(&urls(&["a"])).await.unwrap();
        assert_eq!(report.verdicts.len(), 1);
        assert!(report.passed());
        assert_eq!(analyzer.queue().stats().total_submitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let source = FakeSource::new(&[("a", Category::Performance, 60.0)]).failing("a", Category::Performance, 2);
        let analyzer = Analyzer::new(Arc::new(source), queue(), thresholds(Some(50.0), None));

        let report = analyzer.run(&urls(&["a"])).await.unwrap();
        assert!(report.passed());
        assert_eq!(analyzer.queue().stats().total_dispatched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_failure_fails_run() {
        let source = FakeSource::new(&[("a", Category::Performance, 60.0)]).failing("a", Category::Performance, 10);
        let analyzer = Analyzer::new(Arc::new(source), queue(), thresholds(Some(50.0), None));

        let err = analyzer.run(&urls(&["a"])).await.unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("performance"), "{chain}");
        assert!(chain.contains("backend error"), "{chain}");
    }

    #[tokio::test]
    async fn test_empty_inputs_are_errors() {
        let analyzer = Analyzer::new(Arc::new(FakeSource::new(&[])), queue(), thresholds(Some(1.0), None));
        assert!(analyzer.run(&[]).await.is_err());

        let analyzer = Analyzer::new(Arc::new(FakeSource::new(&[])), queue(), ThresholdsConfig::default());
        assert!(analyzer.run(&urls(&["a"])).await.is_err());
    }

    #[test]
    fn test_average_rounding() {
        let mut page_a = PageScores::new("a".to_string());
        page_a.scores.push((Category::Seo, 33.0));
        let mut page_b = PageScores::new("b".to_string());
        page_b.scores.push((Category::Seo, 34.0));
        let mut page_c = PageScores::new("c".to_string());
        page_c.scores.push((Category::Seo, 34.0));

        assert_eq!(average_for(&[page_a, page_b, page_c], Category::Seo), 33.67);
    }
}
