//! Rated Network client: effectiveness statistics for one validator.
//!
//! Status handling is a small state machine: 200 yields a sample, 429 is
//! retried through the [`RetryPolicy`], everything else ends the fetch
//! for this cycle.
//!
//! https://api.rated.network/docs#/default/get_effectiveness_v0_eth_validators__validator_index__effectiveness_get

use reqwest::StatusCode;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{Config, Granularity};
use crate::keys::ValidationKey;

pub mod retry;

pub use retry::RetryPolicy;

const NETWORK_HEADER: &str = "X-Rated-Network";

#[derive(Debug, Error)]
pub enum RatedError {
    #[error("request to rated network failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authentication failure: {0:?}")]
    Authentication(String),
    #[error("validator not found")]
    NotFound,
    #[error("internal server error received from rated network")]
    ServerError,
    #[error("unknown status code {0} received from rated network")]
    UnknownStatus(u16),
    #[error("unable to decode rated network response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected 1 entry of statistics, got {0}")]
    UnexpectedEntries(usize),
    #[error("failed to fetch validator data after {0} attempts")]
    TooManyAttempts(u32),
}

// ── Wire types ──────────────────────────────────────────────────────

/// Simplified `getValidationEffectiveness` response.
#[derive(Debug, Deserialize)]
struct EffectivenessResponse {
    data: Vec<EffectivenessSample>,
}

/// Statistics of one validator over one window. Values are relayed as-is;
/// a field the service leaves out or sends as `null` stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivenessSample {
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub avg_correctness: Option<f64>,
    #[serde(default)]
    pub attester_effectiveness: Option<f64>,
    #[serde(default)]
    pub proposer_effectiveness: Option<f64>,
    #[serde(default)]
    pub validator_effectiveness: Option<f64>,
    #[serde(default)]
    pub rewards: Option<f64>,
    #[serde(default)]
    pub inclusion_delay: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AuthenticationError {
    detail: String,
}

// ── Client ──────────────────────────────────────────────────────────

pub struct RatedClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    network: String,
    policy: RetryPolicy,
}

impl RatedClient {
    pub fn new(cfg: &Config, policy: RetryPolicy) -> Result<Self, RatedError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: cfg.api_endpoint.clone(),
            access_token: cfg.api_access_token.clone(),
            network: cfg.network.clone(),
            policy,
        })
    }

    /// Fetch the latest effectiveness record of `key` for `granularity`.
    pub async fn fetch_effectiveness(
        &self,
        key: &ValidationKey,
        granularity: Granularity,
    ) -> Result<EffectivenessSample, RatedError> {
        self.fetch_with_sleep(key, granularity, sleep).await
    }

    /// Retry loop behind [`fetch_effectiveness`](Self::fetch_effectiveness).
    /// Every back-off goes through `sleep_for`.
    async fn fetch_with_sleep<S, F>(
        &self,
        key: &ValidationKey,
        granularity: Granularity,
        mut sleep_for: S,
    ) -> Result<EffectivenessSample, RatedError>
    where
        S: FnMut(Duration) -> F,
        F: Future<Output = ()>,
    {
        let url = format!("{}/v0/eth/validators/{}/effectiveness", self.endpoint, key);

        info!(url = %url, validation_key = %key, "fetching rated data for validation key");

        for attempt in 0..self.policy.max_attempts {
            let resp = self
                .client
                .get(&url)
                .query(&[("size", "1"), ("granularity", granularity.as_str())])
                .header(NETWORK_HEADER, &self.network)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| {
                    warn!(url = %url, network = %self.network, validation_key = %key,
                        "unable to fetch validator data: {}", e);
                    RatedError::Transport(e)
                })?;

            match resp.status() {
                StatusCode::OK => {
                    let body = resp.text().await?;
                    return parse_sample(&body, key);
                }
                StatusCode::UNAUTHORIZED => {
                    let body = resp.text().await?;
                    let auth: AuthenticationError = serde_json::from_str(&body)?;
                    error!(url = %url, network = %self.network, detail = %auth.detail,
                        "authentication failure on rated network");
                    return Err(RatedError::Authentication(auth.detail));
                }
                StatusCode::NOT_FOUND => {
                    warn!(url = %url, network = %self.network, validation_key = %key,
                        "validator not found");
                    return Err(RatedError::NotFound);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    if !self.policy.should_retry(attempt) {
                        break;
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        url = %url,
                        network = %self.network,
                        attempt = attempt + 1,
                        retry_in_secs = delay.as_secs_f64(),
                        "rate limit exceeded, backing off"
                    );
                    sleep_for(delay).await;
                }
                StatusCode::INTERNAL_SERVER_ERROR => {
                    error!(url = %url, network = %self.network, validation_key = %key,
                        "internal server error from rated network");
                    return Err(RatedError::ServerError);
                }
                other => {
                    warn!(url = %url, network = %self.network, status = other.as_u16(),
                        validation_key = %key, "unknown status code received");
                    return Err(RatedError::UnknownStatus(other.as_u16()));
                }
            }
        }

        Err(RatedError::TooManyAttempts(self.policy.max_attempts))
    }
}

/// Decode a 200 body. Anything but exactly one entry is an error.
fn parse_sample(body: &str, key: &ValidationKey) -> Result<EffectivenessSample, RatedError> {
    let response: EffectivenessResponse = serde_json::from_str(body)?;

    if response.data.len() != 1 {
        warn!(validation_key = %key, entries = response.data.len(),
            "expected 1 entry of statistics for the validation key");
        return Err(RatedError::UnexpectedEntries(response.data.len()));
    }

    let sample = response.data.into_iter().next().unwrap_or_default();
    info!(validation_key = %key, "successfully fetched statistics for validator");
    Ok(sample)
}
