use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::Tag;

/// Raw upstream answer. Non-200 statuses are data, not errors: callers decide
/// whether a 404 means "missing" or "over".
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub payload: serde_json::Value,
}

impl ApiResponse {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Decode a 200 payload; 404 becomes `NotFound(what)`, anything else
    /// `UnexpectedStatus`.
    pub fn into_payload<T: DeserializeOwned>(self, what: &str) -> Result<T> {
        match self.status {
            200 => Ok(serde_json::from_value(self.payload)?),
            404 => Err(AppError::NotFound(what.to_string())),
            other => Err(AppError::UnexpectedStatus(other)),
        }
    }
}

/// Stateless GET wrapper around the game API. No retries, no caching.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    latency: Arc<LatencyStats>,
}

impl ApiClient {
    pub fn new(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        Self::with_base_url(&cfg.api_url, &cfg.api_token, cfg.http_timeout_secs, latency)
    }

    pub fn with_base_url(
        base_url: &str,
        token: &str,
        timeout_secs: u64,
        latency: Arc<LatencyStats>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            latency,
        })
    }

    /// GET `{base}/{endpoint}`. Only connection-level failures are errors.
    pub async fn fetch(&self, endpoint: &str) -> Result<ApiResponse> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let started = Instant::now();

        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        let elapsed = started.elapsed();
        self.latency.record(elapsed);

        info!(
            status,
            endpoint,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request status code: {status} | {endpoint}"
        );

        let payload = if body.is_empty() {
            serde_json::Value::Null
        } else {
            match serde_json::from_slice(&body) {
                Ok(v) => v,
                Err(e) if status == 200 => return Err(e.into()),
                Err(e) => {
                    debug!(status, "non-JSON error body from {endpoint}: {e}");
                    serde_json::Value::Null
                }
            }
        };

        Ok(ApiResponse { status, payload })
    }

    /// `fetch` + `into_payload` in one step.
    pub async fn fetch_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.fetch(endpoint).await?.into_payload(endpoint)
    }
}

/// Endpoint paths relative to the API base. Tags are always URL-encoded.
pub mod endpoints {
    use super::Tag;

    pub fn clan_members(clan: &Tag) -> String {
        format!("clans/{}/members", clan.url_encoded())
    }

    pub fn current_war(clan: &Tag) -> String {
        format!("clans/{}/currentwar", clan.url_encoded())
    }

    pub fn league_group(clan: &Tag) -> String {
        format!("clans/{}/currentwar/leaguegroup", clan.url_encoded())
    }

    pub fn league_war(war: &Tag) -> String {
        format!("clanwarleagues/wars/{}", war.url_encoded())
    }

    pub fn player(player: &Tag) -> String {
        format!("players/{}", player.url_encoded())
    }
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> ApiClient {
    ApiClient::with_base_url(base_url, "test-token", 5, Arc::new(LatencyStats::new()))
        .expect("test client")
}
