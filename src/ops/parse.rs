//! HTML parse op
//!
//! Extracts the page title and outgoing links from a fetched body. Discovered
//! links are emitted under the `fetch` rule so a pipeline can route them back
//! into its fetch stage; the page metadata goes out under `store`.

use crate::crawler::CrawlerStage;
use crate::task::{StageHandler, TaskContext, TaskOutput};
use crate::{Result, TrellisError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use url::Url;

/// Parses `payload.body` as HTML; emits links under `fetch`, metadata under `store`
pub struct ParseHandler;

#[async_trait]
impl StageHandler for ParseHandler {
    async fn handle(
        &self,
        _context: &TaskContext,
        stage: &CrawlerStage,
        payload: Value,
    ) -> Result<TaskOutput> {
        let url = payload
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TrellisError::Handler {
                handler: "parse".to_string(),
                message: "payload has no 'url'".to_string(),
            })?;
        let body = payload
            .get("body")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let base_url = Url::parse(url)?;
        let page = parse_html(body, &base_url);

        let mut output = TaskOutput::new();
        for link in &page.links {
            output.emit("fetch", json!({ "url": link }));
        }
        output.emit(
            "store",
            json!({
                "url": url,
                "title": page.title,
                "link_count": page.links.len(),
            }),
        );

        tracing::debug!(
            stage = %stage.namespaced_name(),
            %url,
            links = page.links.len(),
            "Parsed page"
        );
        Ok(output)
    }
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub links: Vec<String>,
}

/// Parses HTML content and extracts the title plus absolute outgoing links
///
/// Links come from `a[href]` tags; `javascript:`, `mailto:`, `tel:` and
/// `data:` hrefs are skipped, relative hrefs are resolved against `base_url`,
/// and anything that is not http(s) after resolution is dropped.
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    });

    let mut links = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_link(href, base_url) {
                    links.push(absolute);
                }
            }
        }
    }

    ParsedPage { title, links }
}

/// Resolves an href to an absolute http(s) URL, or None if excluded
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let resolved = base_url.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}
