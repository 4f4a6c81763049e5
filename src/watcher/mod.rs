//! Watcher: periodically samples Rated Network statistics for every
//! configured validation key and publishes them as gauges.
//!
//! Keys are resolved against the beacon node once, here. A key that
//! cannot be resolved is logged and left out for the life of the process;
//! its label stays, so the drop shows up in the per-label counts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::beacon::IndexResolver;
use crate::config::Config;
use crate::keys::{count_keys, labeled_keys, KeyCounts, ResolvedKey};
use crate::metrics::MetricsSink;
use crate::rated::RatedClient;

pub mod poller;

pub use poller::CycleReport;

pub struct Watcher {
    config: Arc<Config>,
    keys: BTreeMap<String, Vec<ResolvedKey>>,
    client: RatedClient,
    metrics: Arc<dyn MetricsSink>,
}

impl Watcher {
    /// Normalize and resolve every configured key. Never fails: keys the
    /// resolver rejects are dropped, the rest are watched.
    pub async fn new(
        config: Arc<Config>,
        resolver: &dyn IndexResolver,
        client: RatedClient,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let labeled = labeled_keys(&config.watcher.validation_keys);

        info!(
            beacon_endpoint = %config.beacon_endpoint,
            rated_endpoint = %config.api_endpoint,
            network = %config.network,
            granularity = config.granularity().as_str(),
            keys_to_watch = count_keys(&labeled).total,
            "created watcher"
        );

        let mut keys = BTreeMap::new();
        for (label, label_keys) in labeled {
            let mut resolved = Vec::with_capacity(label_keys.len());

            for key in label_keys {
                match resolver.resolve_index(&key).await {
                    Ok(index) => {
                        info!(label = %label, validation_key = %key, validation_index = index,
                            "fetched validation index for the given key");
                        resolved.push(ResolvedKey { key, index });
                    }
                    Err(e) => {
                        warn!(label = %label, validation_key = %key,
                            "unable to resolve validation key, it will not be watched: {}", e);
                    }
                }
            }

            keys.insert(label, resolved);
        }

        Self {
            config,
            keys,
            client,
            metrics,
        }
    }

    /// Resolved keys, by label.
    pub fn keys(&self) -> &BTreeMap<String, Vec<ResolvedKey>> {
        &self.keys
    }

    pub fn counts(&self) -> KeyCounts {
        count_keys(&self.keys)
    }

    /// Time between two cycle starts.
    pub fn window(&self) -> Duration {
        self.config.window()
    }
}
