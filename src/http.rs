use reqwest::Client;
use std::time::Duration;
use tracing::warn;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Client for service-to-service calls (catalog, audit, completion endpoint).
///
/// The overall request timeout is left to callers so long completions can set
/// their own deadline per request.
pub fn build_client() -> Client {
    let connect = env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5);
    Client::builder()
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|err| fallback_client("service", err))
}

/// Client used for fetching arbitrary third-party pages.
pub fn build_browser_client(timeout: Duration) -> Client {
    let connect = env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(connect))
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .unwrap_or_else(|err| fallback_client("browser", err))
}

/// Default client used when a configured one cannot be built. It has no user
/// agent and no timeouts.
fn fallback_client(kind: &'static str, err: reqwest::Error) -> Client {
    warn!(
        target = "estate.http",
        client = kind,
        error = %err,
        "client_build_failed_using_defaults"
    );
    Client::new()
}

/// Per-request timeout for catalog/audit calls.
pub fn default_timeout() -> Duration {
    Duration::from_secs(env_secs("HTTP_TIMEOUT_SECS", 15))
}

pub fn env_secs(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
