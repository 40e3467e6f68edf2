//! HTTP fetch op
//!
//! Retrieves the payload URL and emits the response body downstream. Honors
//! two crawler-level hints: `stealthy` rotates through browser user-agents
//! instead of announcing the crawler, and `incremental` skips URLs already
//! fetched in an earlier run (tracked as tags in the crawl-state store).

use crate::crawler::CrawlerStage;
use crate::storage::SharedCrawlStore;
use crate::task::{StageHandler, TaskContext, TaskOutput};
use crate::{Result, TrellisError};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// User agent announced on regular fetches
const CRAWLER_AGENT: &str = concat!("trellis-crawl/", env!("CARGO_PKG_VERSION"));

/// Browser user-agents rotated through when the crawler is stealthy
const STEALTH_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Fetches the URL in `payload.url` and emits `{url, status, content_type, body}`
pub struct FetchHandler {
    client: Client,
    crawls: SharedCrawlStore,
    agent_cursor: AtomicUsize,
}

impl FetchHandler {
    pub fn new(crawls: SharedCrawlStore) -> Self {
        Self {
            client: Client::new(),
            crawls,
            agent_cursor: AtomicUsize::new(0),
        }
    }

    fn user_agent(&self, stealthy: bool) -> &'static str {
        if stealthy {
            let index = self.agent_cursor.fetch_add(1, Ordering::Relaxed);
            STEALTH_AGENTS[index % STEALTH_AGENTS.len()]
        } else {
            CRAWLER_AGENT
        }
    }
}

/// Tag key marking a URL as fetched, for incremental skipping
fn fetch_tag(url: &str) -> String {
    format!("fetch:{}", hex::encode(Sha256::digest(url.as_bytes())))
}

#[async_trait]
impl StageHandler for FetchHandler {
    async fn handle(
        &self,
        context: &TaskContext,
        stage: &CrawlerStage,
        payload: Value,
    ) -> Result<TaskOutput> {
        let url = payload
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TrellisError::Handler {
                handler: "fetch".to_string(),
                message: "payload has no 'url'".to_string(),
            })?;

        let tag = fetch_tag(url);
        if context.incremental && self.crawls.has_tag(&stage.crawler, &tag)? {
            tracing::debug!(%url, "Skipping fetch, URL already seen");
            return Ok(TaskOutput::new());
        }

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent(stage.stealthy))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|source| TrellisError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|source| TrellisError::Http {
                url: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(TrellisError::Handler {
                handler: "fetch".to_string(),
                message: format!("HTTP {} for {}", status.as_u16(), url),
            });
        }

        self.crawls.set_tag(&stage.crawler, &tag)?;
        tracing::debug!(%url, status = status.as_u16(), "Fetched");

        Ok(TaskOutput::pass(json!({
            "url": final_url,
            "status": status.as_u16(),
            "content_type": content_type,
            "body": body,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_fetch_tag_is_stable_and_distinct() {
        let a1 = fetch_tag("https://example.com/a");
        let a2 = fetch_tag("https://example.com/a");
        let b = fetch_tag("https://example.com/b");

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.starts_with("fetch:"));
    }

    #[test]
    fn test_user_agent_selection() {
        let handler = FetchHandler::new(Arc::new(MemoryStore::new()));

        assert_eq!(handler.user_agent(false), CRAWLER_AGENT);

        // Stealthy rotates through the browser agents
        let first = handler.user_agent(true);
        let second = handler.user_agent(true);
        assert!(STEALTH_AGENTS.contains(&first));
        assert!(STEALTH_AGENTS.contains(&second));
        assert_ne!(first, second);
    }
}
