//! Beacon node lookups: resolves a validation key to its validator index.
//!
//! Only used while building the watcher: a key the beacon node cannot
//! resolve is never watched.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::keys::ValidationKey;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("request to beacon node failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("non 200-response code received from beacon: {0}")]
    Status(u16),
    #[error("unable to parse beacon response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("validator index {0:?} is not a number")]
    InvalidIndex(String),
}

/// Resolves validation keys to validator indexes.
#[async_trait]
pub trait IndexResolver: Send + Sync {
    async fn resolve_index(&self, key: &ValidationKey) -> Result<u64, BeaconError>;
}

/// Simplified `getStateValidator` response; only the index matters here.
#[derive(Debug, Deserialize)]
struct StateValidatorResponse {
    data: StateValidatorData,
}

#[derive(Debug, Deserialize)]
struct StateValidatorData {
    index: String,
}

pub struct BeaconClient {
    client: reqwest::Client,
    endpoint: String,
}

impl BeaconClient {
    pub fn new(cfg: &Config) -> Result<Self, BeaconError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: cfg.beacon_endpoint.clone(),
        })
    }
}

#[async_trait]
impl IndexResolver for BeaconClient {
    async fn resolve_index(&self, key: &ValidationKey) -> Result<u64, BeaconError> {
        let url = format!(
            "{}/eth/v1/beacon/states/head/validations/{}",
            self.endpoint, key
        );

        info!(url = %url, validation_key = %key, "fetching index of validation key");

        let resp = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, validation_key = %key, "unable to fetch data about validation key: {}", e);
            BeaconError::Transport(e)
        })?;

        if resp.status() != StatusCode::OK {
            warn!(url = %url, status = resp.status().as_u16(), "unable to fetch data about this validation");
            return Err(BeaconError::Status(resp.status().as_u16()));
        }

        let body = resp.text().await?;
        parse_index(&body)
    }
}

fn parse_index(body: &str) -> Result<u64, BeaconError> {
    let response: StateValidatorResponse = serde_json::from_str(body)?;
    let raw = response.data.index;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| BeaconError::InvalidIndex(raw))
}
