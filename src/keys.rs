//! Validation keys: normalization and per-label coverage counts.
//!
//! Keys come from configuration in whatever form the operator pasted
//! them. Rated Network and beacon nodes expect the `0x`-prefixed hex form,
//! so every key is normalized once when the watcher is built.

use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Length of a BLS public key in hex, without the `0x` prefix.
pub const PUBKEY_HEX_LEN: usize = 96;

/// Label (pool, operator, ...) → keys watched under that label.
pub type LabeledKeySet = BTreeMap<String, Vec<ValidationKey>>;

/// Adds the `0x` prefix to a bare 96-char hex key. Anything else is
/// returned unchanged; malformed keys surface later as upstream errors.
pub fn normalize_key(raw: &str) -> String {
    if raw.len() == PUBKEY_HEX_LEN && !raw.starts_with("0x") {
        info!(key = %raw, "adding '0x' prefix to validation key");
        return format!("0x{raw}");
    }
    raw.to_string()
}

/// A validator public key in its normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidationKey(String);

impl ValidationKey {
    pub fn new(raw: &str) -> Self {
        Self(normalize_key(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key that the beacon node knows about, with its validator index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: ValidationKey,
    pub index: u64,
}

/// Normalize every key of a raw `label → keys` mapping.
pub fn labeled_keys(raw: &BTreeMap<String, Vec<String>>) -> LabeledKeySet {
    raw.iter()
        .map(|(label, keys)| {
            let keys = keys.iter().map(|k| ValidationKey::new(k)).collect();
            (label.clone(), keys)
        })
        .collect()
}

// ── Aggregation ─────────────────────────────────────────────────────

/// How many keys are watched, in total and per label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCounts {
    pub per_label: BTreeMap<String, usize>,
    pub total: usize,
}

/// Count keys per label. Labels with no keys are kept with a count of 0.
pub fn count_keys<T>(set: &BTreeMap<String, Vec<T>>) -> KeyCounts {
    let per_label: BTreeMap<String, usize> = set
        .iter()
        .map(|(label, keys)| (label.clone(), keys.len()))
        .collect();
    let total = per_label.values().sum();

    KeyCounts { per_label, total }
}
