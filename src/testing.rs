//! Scripted collaborators for pipeline and router tests.

use crate::llm::{CompletionModel, LlmError};
use crate::scrape::PageFetcher;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub struct StaticFetcher {
    text: Option<String>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        self.requested.lock().unwrap().push(url.to_string());
        self.text.clone()
    }
}

/// Replays queued completions in order and remembers every prompt it saw.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<(String, String)>>,
    configured: bool,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            configured: true,
            delay: None,
        }
    }

    pub fn replying<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::new(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    /// Each completion takes `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// User prompts in call order.
    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, user)| user.clone())
            .collect()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

pub const IDENTITY_REPLY: &str = r#"Here is the JSON:
{
  "title": "Skyline Residences",
  "subtitle": "Premium 2 & 3 BHK homes in Baner",
  "builder": "Skyline Developers",
  "location": "Baner, Pune",
  "category": "Apartment",
  "status": "Ready to move in",
  "minPrice": 8500000,
  "maxPrice": "1,45,00,000",
  "href": "Skyline Residences Baner",
  "metaTitle": "Skyline Residences Baner | 2 & 3 BHK",
  "metaDescription": "Ready homes by Skyline Developers in Baner.",
  "metaKeywords": "skyline residences, baner apartments",
  "bedrooms": ["2 BHK", "3 BHK"],
  "areas": ["950 sqft", "1350 sqft"]
}"#;

pub const CONTENT_REPLY: &str = r#"{
  "description": "Skyline Residences is a landmark residential address in Baner.",
  "builderDescription": "Skyline Developers has delivered homes across Pune for two decades.",
  "expertOpinions": ["Great connectivity.", "Strong rental demand.", "Quality construction.", "Good amenities.", "Fair pricing."]
}"#;

pub const DETAILS_REPLY: &str = r#"```json
{
  "features": {"Amenities": ["Clubhouse", "Swimming Pool"], "Security": ["CCTV"]},
  "faqs": [{"questions": "Is the project RERA approved?", "answer": "Yes, it is registered."}],
  "accommodation": [
    {"unit": "2 BHK", "area": "950 sqft", "price": "85 Lakh"},
    {"unit": "3 BHK", "area": "1350 sqft", "price": "1.45 Cr"}
  ]
}
```"#;
