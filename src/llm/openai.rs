use crate::http::{build_client, env_secs};
use crate::llm::{CompletionModel, LlmError};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| (0.0..=2.0).contains(v))
                .unwrap_or(0.7),
            timeout: Duration::from_secs(env_secs("LLM_TIMEOUT_SECS", 120)),
            retry: RetryPolicy::from_env(),
        }
    }
}

/// Bounded retry for completion calls. One attempt means no retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            attempts: std::env::var("LLM_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|v| (1..=5).contains(v))
                .unwrap_or(defaults.attempts),
            delay_ms: std::env::var("LLM_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.delay_ms),
        }
    }

    /// Linear backoff plus up to 25% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.delay_ms.saturating_mul(attempt as u64);
        let jitter = if self.delay_ms >= 4 {
            rand::rng().random_range(0..=self.delay_ms / 4)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

pub struct OpenAiClient {
    http: Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    async fn send(&self, api_key: &str, system: &str, prompt: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        if let Some(usage) = &payload.usage {
            debug!(
                target = "estate.llm",
                model = %self.config.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion_usage"
            );
        }

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingCredential)?;
        let attempts = self.config.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send(api_key, system, prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(
                        target = "estate.llm",
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "completion_retry"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config_for(base_url: String, attempts: u32) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: Some("sk-test".into()),
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                attempts,
                delay_ms: 1,
            },
        }
    }

    #[tokio::test]
    async fn sends_one_system_and_one_user_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "describe the project"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"{\"title\":\"Skyline\"}"}}]}"#)
            .create_async()
            .await;

        let client = OpenAiClient::new(config_for(server.url(), 1));
        let text = client
            .complete("be terse", "describe the project")
            .await
            .expect("completion");
        assert_eq!(text, r#"{"title":"Skyline"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":null}}]}"#)
            .create_async()
            .await;

        let client = OpenAiClient::new(config_for(server.url(), 1));
        let err = client.complete("s", "p").await.expect_err("no content");
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = OpenAiClient::new(config_for(server.url(), 1));
        let err = client.complete("s", "p").await.expect_err("bad body");
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_the_policy_bound() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = OpenAiClient::new(config_for(server.url(), 3));
        let err = client.complete("s", "p").await.expect_err("unavailable");
        assert!(matches!(err, LlmError::Status(503)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = OpenAiClient::new(config_for(server.url(), 3));
        let err = client.complete("s", "p").await.expect_err("unauthorized");
        assert!(matches!(err, LlmError::Status(401)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let mut config = config_for("http://127.0.0.1:9".into(), 3);
        config.api_key = None;
        let client = OpenAiClient::new(config);
        assert!(!client.is_configured());
        let err = client.complete("s", "p").await.expect_err("no key");
        assert!(matches!(err, LlmError::MissingCredential));
    }
}
