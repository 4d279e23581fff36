//! Identity verification.
//!
//! Tokens are verified by an external service; the gateway only caches
//! the answers. Successes live for a minute, failures for five, so a
//! misbehaving agent cannot hammer either us or the verifier. Failure
//! logs are throttled to once a minute per token.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config;

#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub name: String,
    pub wallet: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    valid: bool,
    name: Option<String>,
    wallet: Option<String>,
}

pub struct IdentityVerifier {
    base_url: Option<String>,
    client: reqwest::Client,
    allow_test_tokens: bool,
    success: Mutex<HashMap<String, (AgentIdentity, u64)>>,
    failure: Mutex<HashMap<String, u64>>,
    last_failure_log: Mutex<HashMap<String, u64>>,
}

impl IdentityVerifier {
    pub fn from_env() -> Self {
        let base_url = std::env::var(config::ENV_AUTH_SERVICE_URL).ok().filter(|s| !s.is_empty());
        let production = std::env::var(config::ENV_NODE_ENV).map(|v| v == "production").unwrap_or(false);
        match &base_url {
            Some(url) => info!("Identity verification -> {url}"),
            None => warn!(
                "{} not set; only test tokens will verify",
                config::ENV_AUTH_SERVICE_URL
            ),
        }
        Self::new(base_url, !production)
    }

    pub fn new(base_url: Option<String>, allow_test_tokens: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config::AUTH_TIMEOUT_MS))
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            client,
            allow_test_tokens,
            success: Mutex::new(HashMap::new()),
            failure: Mutex::new(HashMap::new()),
            last_failure_log: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a bearer token to an agent, consulting the caches first.
    pub async fn verify(&self, token: &str) -> Option<AgentIdentity> {
        let now = config::now_ms();

        if let Ok(cache) = self.success.lock() {
            if let Some((identity, expires)) = cache.get(token) {
                if *expires > now {
                    return Some(identity.clone());
                }
            }
        }
        if let Ok(cache) = self.failure.lock() {
            if let Some(expires) = cache.get(token) {
                if *expires > now {
                    return None;
                }
            }
        }

        // Test tokens bypass the external service outside production.
        if self.allow_test_tokens {
            if let Some(rest) = token.strip_prefix("test_") {
                if !rest.is_empty() {
                    let identity = AgentIdentity { name: rest.to_string(), wallet: None };
                    self.cache_success(token, identity.clone(), now);
                    return Some(identity);
                }
            }
        }

        match self.verify_remote(token).await {
            Some(identity) => {
                self.cache_success(token, identity.clone(), now);
                Some(identity)
            }
            None => {
                if let Ok(mut cache) = self.failure.lock() {
                    cache.insert(token.to_string(), now + config::AUTH_FAILURE_TTL_MS);
                }
                self.log_failure(token, now);
                None
            }
        }
    }

    async fn verify_remote(&self, token: &str) -> Option<AgentIdentity> {
        let base = self.base_url.as_ref()?;
        let url = format!("{}/verify", base.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "apiKey": token }))
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let body: VerifyResponse = response.json().await.ok()?;
        if !body.valid {
            return None;
        }
        Some(AgentIdentity { name: body.name?, wallet: body.wallet })
    }

    fn cache_success(&self, token: &str, identity: AgentIdentity, now: u64) {
        if let Ok(mut cache) = self.success.lock() {
            cache.insert(token.to_string(), (identity, now + config::AUTH_SUCCESS_TTL_MS));
        }
        if let Ok(mut cache) = self.failure.lock() {
            cache.remove(token);
        }
    }

    fn log_failure(&self, token: &str, now: u64) {
        let Ok(mut log) = self.last_failure_log.lock() else { return };
        let last = log.get(token).copied().unwrap_or(0);
        if now.saturating_sub(last) >= config::AUTH_LOG_THROTTLE_MS {
            log.insert(token.to_string(), now);
            let shown: String = token.chars().take(8).collect();
            warn!("Token {shown}… failed verification");
        }
    }
}
