//! XML sitemap expansion
//!
//! Flattens a sitemap (or a tree of sitemap indexes) into the list of page
//! URLs it references. Nested sitemaps are followed depth-first in document
//! order; each sitemap URL is fetched at most once, which also breaks cycles.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use quick_xml::events::Event;
use reqwest::Client;
use tracing::{debug, info, warn};

/// Source of sitemap documents
#[async_trait]
pub trait SitemapSource: Send + Sync {
    /// Fetch the raw XML for a sitemap URL
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches sitemaps over HTTP
#[derive(Debug, Clone)]
pub struct HttpSitemapSource {
    http: Client,
}

impl HttpSitemapSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("psigate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SitemapSource for HttpSitemapSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(%url, "HttpSitemapSource::fetch: called");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context(format!("Failed to fetch sitemap {}", url))?;

        if !response.status().is_success() {
            return Err(eyre!("Sitemap {} returned HTTP {}", url, response.status()));
        }

        response.text().await.context("Failed to read sitemap body")
    }
}

/// Contents of one sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapDocument {
    /// `<urlset><url><loc>` entries
    pub pages: Vec<String>,

    /// `<sitemapindex><sitemap><loc>` entries
    pub sitemaps: Vec<String>,
}

/// Which `<loc>` parent we are inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Page,
    Sitemap,
}

/// Strip a namespace prefix such as `sm:` from a tag name
fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.to_string(),
    }
}

/// Parse a sitemap or sitemap index document
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut doc = SitemapDocument::default();
    let mut entry: Option<Entry> = None;
    let mut in_loc = false;
    let mut loc = String::new();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()).as_str() {
                "url" => entry = Some(Entry::Page),
                "sitemap" => entry = Some(Entry::Sitemap),
                "loc" if entry.is_some() => {
                    in_loc = true;
                    loc.clear();
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_loc => {
                let text = e.unescape().context("Invalid text in <loc>")?;
                loc.push_str(text.trim());
            }
            Ok(Event::CData(ref e)) if in_loc => {
                loc.push_str(String::from_utf8_lossy(e).trim());
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()).as_str() {
                "loc" if in_loc => {
                    in_loc = false;
                    if !loc.is_empty() {
                        match entry {
                            Some(Entry::Page) => doc.pages.push(loc.clone()),
                            Some(Entry::Sitemap) => doc.sitemaps.push(loc.clone()),
                            None => {}
                        }
                    }
                }
                "url" | "sitemap" => entry = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(eyre!(
                    "Malformed sitemap XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(doc)
}

/// Expands a root sitemap into page URLs
pub struct SitemapExpander<S> {
    source: S,
}

impl<S: SitemapSource> SitemapExpander<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Collect every page URL reachable from `root`
    ///
    /// Pages keep document order: a sitemap's own pages come before those of
    /// the sitemaps it references.
    pub async fn expand(&self, root: &str) -> Result<Vec<String>> {
        debug!(%root, "SitemapExpander::expand: called");
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root.to_string()];

        while let Some(url) = stack.pop() {
            if !visited.insert(url.clone()) {
                warn!(%url, "Sitemap already visited, skipping");
                continue;
            }

            let xml = self.source.fetch(&url).await?;
            let doc = parse_sitemap(&xml).context(format!("Failed to parse sitemap {}", url))?;
            debug!(
                %url,
                pages = doc.pages.len(),
                sitemaps = doc.sitemaps.len(),
                "SitemapExpander::expand: parsed"
            );

            pages.extend(doc.pages);
            // Reversed so the first child is expanded first
            stack.extend(doc.sitemaps.into_iter().rev());
        }

        info!(%root, count = pages.len(), "Expanded sitemap");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory sitemap source that records fetch order
    struct MapSource {
        docs: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl MapSource {
        fn new(docs: &[(&str, String)]) -> Self {
            Self {
                docs: docs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SitemapSource for MapSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.docs.get(url).cloned().ok_or_else(|| eyre!("404 for {}", url))
        }
    }

    fn urlset(pages: &[&str]) -> String {
        let entries: String = pages.iter().map(|p| format!("<url><loc>{}</loc></url>", p)).collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
            entries
        )
    }

    fn index(sitemaps: &[&str]) -> String {
        let entries: String = sitemaps
            .iter()
            .map(|s| format!("<sitemap><loc>{}</loc><lastmod>2024-01-01</lastmod></sitemap>", s))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</sitemapindex>"#,
            entries
        )
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/</loc>
    <lastmod>2024-05-01</lastmod>
  </url>
  <url>
    <loc> https://example.com/about?a=1&amp;b=2 </loc>
  </url>
</urlset>"#;

        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(doc.pages, vec!["https://example.com/", "https://example.com/about?a=1&b=2"]);
        assert!(doc.sitemaps.is_empty());
    }

    #[test]
    fn test_parse_index() {
        let doc = parse_sitemap(&index(&["https://example.com/a.xml", "https://example.com/b.xml"])).unwrap();
        assert_eq!(doc.sitemaps, vec!["https://example.com/a.xml", "https://example.com/b.xml"]);
        assert!(doc.pages.is_empty());
    }

    #[test]
    fn test_parse_prefixed_and_cdata() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
<sm:url><sm:loc><![CDATA[https://example.com/x]]></sm:loc></sm:url>
</sm:urlset>"#;
        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(doc.pages, vec!["https://example.com/x"]);
    }

    #[test]
    fn test_parse_single_entry() {
        let doc = parse_sitemap(&urlset(&["https://example.com/only"])).unwrap();
        assert_eq!(doc.pages, vec!["https://example.com/only"]);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_sitemap("<urlset><url><loc>x</url></urlset>").is_err());
    }

    #[tokio::test]
    async fn test_expand_nested_depth_first() {
        let source = MapSource::new(&[
            ("root", index(&["a", "b"])),
            ("a", index(&["a1"])),
            ("a1", urlset(&["p1", "p2"])),
            ("b", urlset(&["p3"])),
        ]);

        let expander = SitemapExpander::new(source);
        let pages = expander.expand("root").await.unwrap();
        assert_eq!(pages, vec!["p1", "p2", "p3"]);
        assert_eq!(*expander.source.fetched.lock().unwrap(), vec!["root", "a", "a1", "b"]);
    }

    #[tokio::test]
    async fn test_expand_breaks_cycles() {
        let source = MapSource::new(&[
            ("root", index(&["child"])),
            ("child", index(&["root", "leaf"])),
            ("leaf", urlset(&["p1"])),
        ]);

        let expander = SitemapExpander::new(source);
        let pages = expander.expand("root").await.unwrap();
        assert_eq!(pages, vec!["p1"]);
        assert_eq!(expander.source.fetched.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_expand_fetches_shared_child_once() {
        let source = MapSource::new(&[
            ("root", index(&["a", "b"])),
            ("a", index(&["shared"])),
            ("b", index(&["shared"])),
            ("shared", urlset(&["p1"])),
        ]);

        let expander = SitemapExpander::new(source);
        let pages = expander.expand("root").await.unwrap();
        assert_eq!(pages, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_expand_propagates_fetch_error() {
        let source = MapSource::new(&[("root", index(&["missing"]))]);
        let expander = SitemapExpander::new(source);
        let err = expander.expand("root").await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
