//! Sentinel configuration, loaded once from YAML at startup.
//!
//! The loaded [`Config`] is immutable and shared as `Arc<Config>` between
//! the watch loop and the metrics server.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var that overrides `rated.apiAccessToken` from the file.
pub const ACCESS_TOKEN_ENV: &str = "RATED_API_ACCESS_TOKEN";

const DEFAULT_NETWORK: &str = "mainnet";
const DEFAULT_LISTEN_ON: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sampling window used for the upstream query and the loop cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }

    /// Time between two cycle starts.
    pub fn window(&self) -> Duration {
        match self {
            Granularity::Hour => Duration::from_secs(3600),
            Granularity::Day => Duration::from_secs(24 * 3600),
        }
    }

    /// Hourly aggregates only exist on mainnet; other networks use `day`.
    pub fn for_network(self, network: &str) -> Self {
        if network == DEFAULT_NETWORK {
            self
        } else {
            Granularity::Day
        }
    }
}

/// On-disk layout: everything lives under a top-level `rated:` key.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    rated: Config,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Rated Network API, e.g. `https://api.rated.network`.
    pub api_endpoint: String,
    #[serde(default)]
    pub api_access_token: String,
    #[serde(default = "default_network")]
    pub network: String,
    /// Beacon node REST API used to resolve validator indexes.
    pub beacon_endpoint: String,
    /// `host:port`, or `:port` for all interfaces.
    #[serde(default = "default_listen_on")]
    pub listen_on: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    #[serde(default)]
    pub granularity: Granularity,
    /// label → raw validation keys.
    #[serde(default)]
    pub validation_keys: BTreeMap<String, Vec<String>>,
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

fn default_listen_on() -> String {
    DEFAULT_LISTEN_ON.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    /// Default config location: `$HOME/.rated-cli.yaml`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(home.join(".rated-cli.yaml"))
    }

    /// Read, parse and validate the config file. The access token may be
    /// overridden from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read configuration file {}", path.display()))?;
        let token = std::env::var(ACCESS_TOKEN_ENV).ok();
        Self::from_yaml(&raw, token)
    }

    /// Parse a YAML document. `token_override` replaces the file's token
    /// when set and non-empty.
    pub fn from_yaml(raw: &str, token_override: Option<String>) -> Result<Self> {
        let file: ConfigFile =
            serde_yaml::from_str(raw).context("unable to parse configuration file")?;
        let mut cfg = file.rated;

        if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
            cfg.api_access_token = token;
        }

        cfg.api_endpoint = cfg.api_endpoint.trim_end_matches('/').to_string();
        cfg.beacon_endpoint = cfg.beacon_endpoint.trim_end_matches('/').to_string();

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.api_endpoint.trim().is_empty() {
            bail!("rated.apiEndpoint is empty");
        }
        if self.beacon_endpoint.trim().is_empty() {
            bail!("rated.beaconEndpoint is empty");
        }
        if self.timeout_secs == 0 {
            bail!("rated.timeoutSecs must be greater than zero");
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Granularity actually used, after the network override.
    pub fn granularity(&self) -> Granularity {
        self.watcher.granularity.for_network(&self.network)
    }

    pub fn window(&self) -> Duration {
        self.granularity().window()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parse `listen_on`. A bare `:port` binds every interface.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let addr = if self.listen_on.starts_with(':') {
            format!("0.0.0.0{}", self.listen_on)
        } else {
            self.listen_on.clone()
        };
        addr.parse()
            .with_context(|| format!("invalid rated.listenOn address '{}'", self.listen_on))
    }
}
