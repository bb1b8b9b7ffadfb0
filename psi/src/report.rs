//! Analysis results and their terminal rendering

use std::fmt::Write;

use colored::Colorize;
use serde::Serialize;

use crate::insights::Category;

/// Scores collected for one page
#[derive(Debug, Clone, Serialize)]
pub struct PageScores {
    pub url: String,
    pub scores: Vec<(Category, f64)>,
}

impl PageScores {
    pub fn new(url: String) -> Self {
        Self {
            url,
            scores: Vec::new(),
        }
    }

    pub fn score(&self, category: Category) -> Option<f64> {
        self.scores.iter().find(|(c, _)| *c == category).map(|(_, s)| *s)
    }
}

/// Average and threshold outcome for one category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryVerdict {
    pub category: Category,
    pub average: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// Full outcome of an analysis run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub pages: Vec<PageScores>,
    pub verdicts: Vec<CategoryVerdict>,
}

impl Report {
    /// True when every checked category met its threshold
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    pub fn verdict(&self, category: Category) -> Option<&CategoryVerdict> {
        self.verdicts.iter().find(|v| v.category == category)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CategoryVerdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }

    /// Per-page scores followed by the category summary
    pub fn render(&self) -> String {
        let mut out = String::new();

        for page in &self.pages {
            let _ = writeln!(out, "{}", page.url.bold());
            for (category, score) in &page.scores {
                let _ = writeln!(out, "  {:<16} {:>6.2}", category.label(), score);
            }
        }

        if !self.pages.is_empty() {
            out.push('\n');
        }

        let _ = writeln!(out, "{:<16} {:>8} {:>10}  Result", "Category", "Average", "Threshold");
        for verdict in &self.verdicts {
            let status = if verdict.passed {
                "PASS".green().bold()
            } else {
                "FAIL".red().bold()
            };
            let _ = writeln!(
                out,
                "{:<16} {:>8.2} {:>10.2}  {}",
                verdict.category.label(),
                verdict.average,
                verdict.threshold,
                status
            );
        }

        out
    }
}
