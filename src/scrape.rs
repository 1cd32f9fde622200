use crate::http::{build_browser_client, env_secs};
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Node};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on scraped characters handed to the model.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

/// Bytes of HTML read from a page before the rest is discarded.
pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

/// Elements whose text never counts as visible page content.
const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "nav", "footer", "iframe", "noscript", "svg", "template",
];

/// Elements that start a new line of text when rendered.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt",
    "figcaption", "figure", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Retrieves the visible text of a page. Every failure is soft: `None` means
/// "no scraped content available" and callers carry on without it.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Option<String>;
}

pub struct HttpPageFetcher {
    http: Client,
    max_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_browser_client(timeout),
            max_bytes: MAX_PAGE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn from_env() -> Self {
        Self::new(Duration::from_secs(env_secs("SCRAPE_TIMEOUT_SECS", 15)))
    }

    async fn fetch_html(&self, url: &Url) -> Result<String, String> {
        let mut response = self
            .http
            .get(url.clone())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| err.to_string())? {
            let room = self.max_bytes - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_bytes {
                debug!(
                    target = "estate.scrape",
                    url = %url,
                    max_bytes = self.max_bytes,
                    "page_body_capped"
                );
                break;
            }
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        let parsed = match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
            Ok(parsed) => {
                warn!(target = "estate.scrape", url, scheme = parsed.scheme(), "unsupported_url_scheme");
                return None;
            }
            Err(err) => {
                warn!(target = "estate.scrape", url, error = %err, "invalid_url");
                return None;
            }
        };

        let html = match self.fetch_html(&parsed).await {
            Ok(html) => html,
            Err(err) => {
                warn!(target = "estate.scrape", url, error = %err, "page_fetch_failed");
                return None;
            }
        };

        let text = truncate_chars(&visible_text(&html), MAX_CONTEXT_CHARS);
        debug!(
            target = "estate.scrape",
            url,
            html_bytes = html.len(),
            text_chars = text.chars().count(),
            "page_scraped"
        );
        (!text.is_empty()).then_some(text)
    }
}

/// Visible text of an HTML document with non-content elements removed and
/// whitespace collapsed to single spaces. Adjacent inline text is joined as
/// written; a space separates text only where the page had whitespace, a
/// `<br>`, or a block boundary.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    let mut pending_space = false;
    let mut last_block = None;
    for node in document.root_element().descendants() {
        let text: &str = match node.value() {
            Node::Element(el) if el.name() == "br" => {
                pending_space = true;
                continue;
            }
            Node::Text(text) => text,
            _ => continue,
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let block = node
            .ancestors()
            .find(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| BLOCK_TAGS.contains(&el.name()))
            })
            .map(|ancestor| ancestor.id());
        if block != last_block {
            pending_space = true;
            last_block = block;
        }

        if text.starts_with(char::is_whitespace) {
            pending_space = true;
        }
        let mut wrote = false;
        for word in text.split_whitespace() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
            pending_space = true;
            wrote = true;
        }
        if wrote {
            pending_space = text.ends_with(char::is_whitespace);
        }
    }
    out
}

pub fn truncate_chars(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
