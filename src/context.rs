use crate::models::GenerationInput;
use crate::scrape::{MAX_CONTEXT_CHARS, PageFetcher, truncate_chars};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextKind {
    Name,
    RawText,
    Url,
}

/// The one text representation every stage prompt is built from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub kind: ContextKind,
    pub text: String,
    pub source_url: Option<String>,
}

impl Context {
    /// Text block used inside stage prompts.
    pub fn prompt_block(&self) -> String {
        match self.kind {
            ContextKind::Url if self.text.is_empty() => format!(
                "Source URL: {}\n(no page content could be retrieved; rely on the URL and general knowledge, and use \"TBD\" for anything unknown)",
                self.source_url.as_deref().unwrap_or_default()
            ),
            ContextKind::Url => format!(
                "Source URL: {}\nScraped page content:\n{}",
                self.source_url.as_deref().unwrap_or_default(),
                self.text
            ),
            ContextKind::RawText => format!("Project information provided by the user:\n{}", self.text),
            ContextKind::Name => format!("Project: {}", self.text),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.text.is_empty()
    }
}

pub async fn normalize(input: &GenerationInput, fetcher: &dyn PageFetcher) -> Context {
    match input {
        GenerationInput::Url(url) => {
            let text = match fetcher.fetch_text(url).await {
                Some(text) => truncate_chars(&text, MAX_CONTEXT_CHARS),
                None => {
                    warn!(target = "estate.pipeline", url = %url, "scrape_unavailable_continuing");
                    String::new()
                }
            };
            Context {
                kind: ContextKind::Url,
                text,
                source_url: Some(url.clone()),
            }
        }
        GenerationInput::RawText(text) => Context {
            kind: ContextKind::RawText,
            text: text.clone(),
            source_url: None,
        },
        GenerationInput::Name { name, location } => Context {
            kind: ContextKind::Name,
            text: describe_name(name, location.as_deref()),
            source_url: None,
        },
    }
}

fn describe_name(name: &str, location: Option<&str>) -> String {
    match location {
        Some(location) => format!("Real estate project \"{name}\" located in {location}."),
        None => format!("Real estate project \"{name}\"."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticFetcher;

    #[tokio::test]
    async fn raw_text_is_kept_verbatim() {
        let input = GenerationInput::RawText("  Tower A, 2 & 3 BHK\nRERA approved ".into());
        let context = normalize(&input, &StaticFetcher::failing()).await;
        assert_eq!(context.kind, ContextKind::RawText);
        assert_eq!(context.text, "  Tower A, 2 & 3 BHK\nRERA approved ");
    }

    #[tokio::test]
    async fn name_and_location_become_one_line() {
        let input = GenerationInput::Name {
            name: "Prestige Lakeside".into(),
            location: Some("Whitefield, Bangalore".into()),
        };
        let context = normalize(&input, &StaticFetcher::failing()).await;
        assert_eq!(context.kind, ContextKind::Name);
        assert_eq!(
            context.text,
            "Real estate project \"Prestige Lakeside\" located in Whitefield, Bangalore."
        );
    }

    #[tokio::test]
    async fn name_without_location() {
        let input = GenerationInput::Name {
            name: "Orchid Villas".into(),
            location: None,
        };
        let context = normalize(&input, &StaticFetcher::failing()).await;
        assert_eq!(context.text, "Real estate project \"Orchid Villas\".");
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_empty_context() {
        let input = GenerationInput::Url("https://example.com/project-x".into());
        let context = normalize(&input, &StaticFetcher::failing()).await;
        assert_eq!(context.kind, ContextKind::Url);
        assert!(!context.has_content());
        assert!(context.prompt_block().contains("no page content"));
        assert!(context.prompt_block().contains("https://example.com/project-x"));
    }

    #[tokio::test]
    async fn fetched_text_is_bounded() {
        let input = GenerationInput::Url("https://example.com/long".into());
        let fetcher = StaticFetcher::with_text("a".repeat(15_000));
        let context = normalize(&input, &fetcher).await;
        assert_eq!(context.text.chars().count(), MAX_CONTEXT_CHARS);
    }
}
