//! Prometheus metrics exposed by the watcher.
//!
//! The watch loop only talks to [`MetricsSink`]. [`WatcherMetrics`] is the
//! Prometheus implementation; its gauges live in a registry owned by the
//! caller, which the HTTP server gathers from.

use anyhow::Result;
use prometheus::{Gauge, GaugeVec, Opts, Registry};

use crate::keys::KeyCounts;
use crate::rated::EffectivenessSample;

const NAMESPACE: &str = "rated";
const SUBSYSTEM: &str = "sentinel";

/// Receives gauge updates from the watch loop. Every update is a `set`;
/// values from earlier cycles are overwritten, never accumulated.
pub trait MetricsSink: Send + Sync {
    fn set_monitored_keys(&self, counts: &KeyCounts);

    /// Publish one sample under `{label, pubkey}`. Fields the sample lacks
    /// keep their previous value.
    fn record_sample(&self, label: &str, pubkey: &str, sample: &EffectivenessSample);
}

#[derive(Clone)]
pub struct WatcherMetrics {
    pub monitored_keys: Gauge,
    pub monitored_keys_per_label: GaugeVec,
    pub uptime: GaugeVec,
    pub correctness: GaugeVec,
    pub attester_effectiveness: GaugeVec,
    pub proposer_effectiveness: GaugeVec,
    pub effectiveness: GaugeVec,
    pub rewards: GaugeVec,
    pub inclusion_delay: GaugeVec,
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(SUBSYSTEM)
}

fn key_gauge(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec> {
    let g = GaugeVec::new(opts(name, help), &["label", "pubkey"])?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

impl WatcherMetrics {
    /// Create the watcher gauges and register them in `registry`.
    pub fn new(registry: &Registry) -> Result<Self> {
        tracing::info!("creating Prometheus metrics for watcher");

        let monitored_keys = Gauge::with_opts(opts("monitored_keys", "Number of validation keys watched."))?;
        registry.register(Box::new(monitored_keys.clone()))?;

        let monitored_keys_per_label = GaugeVec::new(
            opts("monitored_keys_per_label", "Number of validation keys watched per label."),
            &["label"],
        )?;
        registry.register(Box::new(monitored_keys_per_label.clone()))?;

        Ok(Self {
            monitored_keys,
            monitored_keys_per_label,
            uptime: key_gauge(registry, "validation_key_uptime", "Uptime of a validation key.")?,
            correctness: key_gauge(
                registry,
                "validation_key_correctness",
                "Average correctness of a validation key.",
            )?,
            attester_effectiveness: key_gauge(
                registry,
                "validation_key_attester_effectiveness",
                "Attester effectiveness of a validation key.",
            )?,
            proposer_effectiveness: key_gauge(
                registry,
                "validation_key_proposer_effectiveness",
                "Proposer effectiveness of a validation key.",
            )?,
            effectiveness: key_gauge(
                registry,
                "validation_key_effectiveness",
                "Effectiveness of a validation key.",
            )?,
            rewards: key_gauge(
                registry,
                "validation_key_rewards",
                "All consensus and execution layer rewards for the key.",
            )?,
            inclusion_delay: key_gauge(
                registry,
                "validation_key_inclusion_delay",
                "Average inclusion delay for the observed period.",
            )?,
        })
    }
}

impl MetricsSink for WatcherMetrics {
    fn set_monitored_keys(&self, counts: &KeyCounts) {
        self.monitored_keys.set(counts.total as f64);
        for (label, count) in &counts.per_label {
            self.monitored_keys_per_label
                .with_label_values(&[label.as_str()])
                .set(*count as f64);
        }
    }

    fn record_sample(&self, label: &str, pubkey: &str, sample: &EffectivenessSample) {
        let fields = [
            (&self.uptime, sample.uptime),
            (&self.correctness, sample.avg_correctness),
            (&self.attester_effectiveness, sample.attester_effectiveness),
            (&self.proposer_effectiveness, sample.proposer_effectiveness),
            (&self.effectiveness, sample.validator_effectiveness),
            (&self.rewards, sample.rewards),
            (&self.inclusion_delay, sample.inclusion_delay),
        ];

        for (gauge, value) in fields {
            if let Some(v) = value {
                gauge.with_label_values(&[label, pubkey]).set(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn full_sample() -> EffectivenessSample {
        EffectivenessSample {
            uptime: Some(0.99),
            avg_correctness: Some(0.98),
            attester_effectiveness: Some(0.97),
            proposer_effectiveness: Some(0.96),
            validator_effectiveness: Some(0.95),
            rewards: Some(10.0),
            inclusion_delay: Some(1.2),
        }
    }

    #[test]
    fn test_registers_all_gauges() {
        let registry = Registry::new();
        let metrics = WatcherMetrics::new(&registry).unwrap();
        metrics.record_sample("pool", "0x1", &full_sample());
        metrics.set_monitored_keys(&KeyCounts {
            per_label: BTreeMap::from([("pool".to_string(), 1)]),
            total: 1,
        });

        let names: Vec<String> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        for expected in [
            "rated_sentinel_monitored_keys",
            "rated_sentinel_monitored_keys_per_label",
            "rated_sentinel_validation_key_uptime",
            "rated_sentinel_validation_key_correctness",
            "rated_sentinel_validation_key_attester_effectiveness",
            "rated_sentinel_validation_key_proposer_effectiveness",
            "rated_sentinel_validation_key_effectiveness",
            "rated_sentinel_validation_key_rewards",
            "rated_sentinel_validation_key_inclusion_delay",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        WatcherMetrics::new(&registry).unwrap();
        assert!(WatcherMetrics::new(&registry).is_err());
    }

    #[test]
    fn test_record_sample_sets_every_field() {
        let metrics = WatcherMetrics::new(&Registry::new()).unwrap();
        metrics.record_sample("pool", "0x1", &full_sample());

        let get = |g: &GaugeVec| g.with_label_values(&["pool", "0x1"]).get();
        assert_eq!(get(&metrics.uptime), 0.99);
        assert_eq!(get(&metrics.correctness), 0.98);
        assert_eq!(get(&metrics.attester_effectiveness), 0.97);
        assert_eq!(get(&metrics.proposer_effectiveness), 0.96);
        assert_eq!(get(&metrics.effectiveness), 0.95);
        assert_eq!(get(&metrics.rewards), 10.0);
        assert_eq!(get(&metrics.inclusion_delay), 1.2);
    }

    #[test]
    fn test_record_sample_overwrites() {
        let metrics = WatcherMetrics::new(&Registry::new()).unwrap();
        metrics.record_sample("pool", "0x1", &full_sample());
        metrics.record_sample("pool", "0x1", &full_sample());

        let uptime = metrics.uptime.with_label_values(&["pool", "0x1"]).get();
        assert_eq!(uptime, 0.99, "set, not incremented");
    }

    #[test]
    fn test_missing_field_keeps_previous_value() {
        let metrics = WatcherMetrics::new(&Registry::new()).unwrap();
        metrics.record_sample("pool", "0x1", &full_sample());

        let partial = EffectivenessSample {
            uptime: Some(0.5),
            proposer_effectiveness: None,
            ..full_sample()
        };
        metrics.record_sample("pool", "0x1", &partial);

        assert_eq!(metrics.uptime.with_label_values(&["pool", "0x1"]).get(), 0.5);
        assert_eq!(
            metrics.proposer_effectiveness.with_label_values(&["pool", "0x1"]).get(),
            0.96
        );
    }

    #[test]
    fn test_same_key_under_two_labels_is_two_series() {
        let metrics = WatcherMetrics::new(&Registry::new()).unwrap();
        metrics.record_sample("a", "0x1", &full_sample());
        metrics.record_sample("b", "0x1", &EffectivenessSample { uptime: Some(0.1), ..full_sample() });

        assert_eq!(metrics.uptime.with_label_values(&["a", "0x1"]).get(), 0.99);
        assert_eq!(metrics.uptime.with_label_values(&["b", "0x1"]).get(), 0.1);
    }

    #[test]
    fn test_monitored_keys_per_label() {
        let metrics = WatcherMetrics::new(&Registry::new()).unwrap();
        let counts = KeyCounts {
            per_label: BTreeMap::from([("a".to_string(), 2), ("b".to_string(), 0)]),
            total: 2,
        };
        metrics.set_monitored_keys(&counts);

        assert_eq!(metrics.monitored_keys.get(), 2.0);
        assert_eq!(metrics.monitored_keys_per_label.with_label_values(&["a"]).get(), 2.0);
        assert_eq!(metrics.monitored_keys_per_label.with_label_values(&["b"]).get(), 0.0);
    }
}
