use crate::models::{GenerateResponse, GenerationRequest};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

const KEY_PREFIX: &str = "estate:idempotency:";

/// Responses keyed by the caller's `Idempotency-Key` header. Redis when
/// `REDIS_URL` is set, otherwise a process-local map.
///
/// A key is reserved before the pipeline runs, so a concurrent duplicate sees
/// it in flight instead of starting a second generation.
pub enum IdempotencyCache {
    Memory(Mutex<HashMap<String, Entry>>),
    Redis { client: redis::Client, ttl_secs: u64 },
}

/// What is stored under a key: the request fingerprint, plus the response
/// once the first attempt succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    fingerprint: String,
    response: Option<GenerateResponse>,
}

#[derive(Debug)]
pub enum Claim {
    /// The caller owns the key and must `complete` or `release` it.
    Claimed,
    Replay(Box<GenerateResponse>),
    InFlight,
    /// The key was first used with a different request body.
    Mismatch,
}

impl Entry {
    fn claim(&self, fingerprint: &str) -> Claim {
        if self.fingerprint != fingerprint {
            return Claim::Mismatch;
        }
        match &self.response {
            Some(response) => Claim::Replay(Box::new(response.clone())),
            None => Claim::InFlight,
        }
    }
}

/// Stable digest of the request body, comparable across processes.
pub fn fingerprint(request: &GenerationRequest) -> String {
    let body = serde_json::to_vec(request).unwrap_or_default();
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &body).simple().to_string()
}

impl IdempotencyCache {
    pub fn memory() -> Self {
        Self::Memory(Mutex::new(HashMap::new()))
    }

    pub fn from_env() -> Self {
        let ttl_secs = std::env::var("IDEMPOTENCY_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3600);
        match std::env::var("REDIS_URL").ok().map(redis::Client::open) {
            Some(Ok(client)) => Self::Redis { client, ttl_secs },
            Some(Err(err)) => {
                warn!(target = "estate.api", error = %err, "invalid REDIS_URL; idempotency cache is in-memory");
                Self::memory()
            }
            None => Self::memory(),
        }
    }

    /// Reserve `key` for this request, or report why it cannot run.
    pub async fn begin(&self, key: &str, fingerprint: &str) -> Claim {
        let pending = Entry {
            fingerprint: fingerprint.to_string(),
            response: None,
        };
        match self {
            Self::Memory(map) => {
                let mut map = map.lock().await;
                match map.get(key) {
                    Some(existing) => existing.claim(fingerprint),
                    None => {
                        map.insert(key.to_string(), pending);
                        Claim::Claimed
                    }
                }
            }
            Self::Redis { client, ttl_secs } => {
                match redis_begin(client, key, &pending, *ttl_secs).await {
                    Ok(claim) => claim,
                    Err(err) => {
                        // Without Redis there is nothing to reserve against.
                        warn!(target = "estate.api", error = %err, "redis unavailable; running without idempotency");
                        Claim::Claimed
                    }
                }
            }
        }
    }

    /// Store the response for a claimed key.
    pub async fn complete(&self, key: &str, fingerprint: &str, response: &GenerateResponse) {
        let entry = Entry {
            fingerprint: fingerprint.to_string(),
            response: Some(response.clone()),
        };
        match self {
            Self::Memory(map) => {
                map.lock().await.insert(key.to_string(), entry);
            }
            Self::Redis { client, ttl_secs } => {
                if let Ok(mut conn) = client.get_multiplexed_async_connection().await
                    && let Ok(json) = serde_json::to_string(&entry)
                {
                    let stored: Result<(), _> = conn.set_ex(redis_key(key), json, *ttl_secs).await;
                    if let Err(err) = stored {
                        warn!(target = "estate.api", error = %err, "idempotency write failed");
                    }
                }
            }
        }
    }

    /// Drop the reservation after a failed attempt so the caller can retry.
    pub async fn release(&self, key: &str) {
        match self {
            Self::Memory(map) => {
                map.lock().await.remove(key);
            }
            Self::Redis { client, .. } => {
                if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                    let removed: Result<(), _> = conn.del(redis_key(key)).await;
                    if let Err(err) = removed {
                        warn!(target = "estate.api", error = %err, "idempotency release failed");
                    }
                }
            }
        }
    }
}

async fn redis_begin(
    client: &redis::Client,
    key: &str,
    pending: &Entry,
    ttl_secs: u64,
) -> redis::RedisResult<Claim> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let json = serde_json::to_string(pending).unwrap_or_default();
    let reserved: Option<String> = redis::cmd("SET")
        .arg(redis_key(key))
        .arg(json)
        .arg("NX")
        .arg("EX")
        .arg(ttl_secs)
        .query_async(&mut conn)
        .await?;
    if reserved.is_some() {
        return Ok(Claim::Claimed);
    }
    let stored: Option<String> = conn.get(redis_key(key)).await?;
    Ok(
        match stored.and_then(|v| serde_json::from_str::<Entry>(&v).ok()) {
            Some(existing) => existing.claim(&pending.fingerprint),
            // Expired between SET and GET; treat as still in flight.
            None => Claim::InFlight,
        },
    )
}

fn redis_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}
