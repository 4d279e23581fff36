//! Betting/settlement collaborator.
//!
//! The core only emits lifecycle notifications; everything else about
//! betting lives in the external service. Calls are fire-and-forget from
//! the tick thread: a background task does the HTTP work and failures are
//! logged (throttled per endpoint), never propagated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResolution {
    pub match_id: String,
    pub winner_agent_names: Vec<String>,
    pub winner_agent_wallets: Vec<String>,
    pub is_draw: bool,
}

#[derive(Clone)]
pub struct SettlementNotifier {
    base_url: Option<String>,
    client: reqwest::Client,
    /// endpoint → last warn time, shared with the background tasks.
    warn_times: Arc<Mutex<HashMap<&'static str, u64>>>,
}

impl SettlementNotifier {
    pub fn from_env() -> Self {
        let base_url = std::env::var(config::ENV_SETTLEMENT_URL).ok().filter(|s| !s.is_empty());
        match &base_url {
            Some(url) => info!("Settlement notifications -> {url}"),
            None => info!("{} not set, settlement notifications disabled", config::ENV_SETTLEMENT_URL),
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
            warn_times: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            base_url: None,
            client: reqwest::Client::new(),
            warn_times: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn open_betting(&self, match_id: &str, agent_names: &[String], closeable: bool) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            match_id: &'a str,
            agent_names: &'a [String],
            closeable: bool,
        }
        self.post("open", &Body { match_id, agent_names, closeable });
    }

    pub fn add_betting_agent(&self, match_id: &str, agent_name: &str) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            match_id: &'a str,
            agent_name: &'a str,
        }
        self.post("agents", &Body { match_id, agent_name });
    }

    pub fn close_betting(&self, match_id: &str) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            match_id: &'a str,
        }
        self.post("close", &Body { match_id });
    }

    pub fn resolve_match(&self, resolution: &MatchResolution) {
        self.post("resolve", resolution);
    }

    fn post<T: Serialize>(&self, endpoint: &'static str, body: &T) {
        let Some(base) = &self.base_url else {
            debug!("Settlement {endpoint} skipped (disabled)");
            return;
        };
        let url = format!("{}/betting/{endpoint}", base.trim_end_matches('/'));
        let request = self.client.post(url).json(body);
        let warn_times = self.warn_times.clone();

        tokio::spawn(async move {
            let result = request.send().await.and_then(|r| r.error_for_status());
            if let Err(e) = result {
                let now = config::now_ms();
                let mut times = match warn_times.lock() {
                    Ok(t) => t,
                    Err(_) => return,
                };
                let last = times.get(endpoint).copied().unwrap_or(0);
                if now.saturating_sub(last) >= 60_000 {
                    times.insert(endpoint, now);
                    warn!("Settlement {endpoint} notification failed: {e}");
                }
            }
        });
    }
}
