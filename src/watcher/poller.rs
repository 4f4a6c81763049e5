//! Watch loop: one sampling cycle per window, forever.
//!
//! Keys are sampled one after the other. A failing key is logged and
//! skipped; its gauges keep their last value until a later cycle
//! succeeds. The next cycle starts at `cycle start + window`, however long
//! sampling took.

use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use super::Watcher;

/// Outcome of one sampling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Start of the cycle after the one that started at `start`.
pub fn next_start(start: Instant, window: Duration) -> Instant {
    start + window
}

/// How long to sleep before `next`. Zero if sampling overran the window.
pub fn time_until(next: Instant, now: Instant) -> Duration {
    next.saturating_duration_since(now)
}

/// Run `cycle` forever, one start every `window`. The next start is
/// `previous start + window`; a cycle that overruns is followed at once.
pub async fn run_every<F, Fut>(window: Duration, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CycleReport>,
{
    loop {
        let start = Instant::now();
        let next = next_start(start, window);
        let start_at = Utc::now();
        let next_at = start_at + chrono::Duration::seconds(window.as_secs() as i64);

        info!(start_at = %start_at, next_at = %next_at, "starting new iteration");

        let report = cycle().await;

        let remaining = time_until(next, Instant::now());
        if remaining.is_zero() {
            warn!(
                elapsed_secs = report.elapsed.as_secs(),
                window_secs = window.as_secs(),
                "sampling overran the window, starting next iteration now"
            );
        } else {
            info!(sleep_for_secs = remaining.as_secs(), "sleeping until next iteration");
        }

        sleep_until(next).await;
        info!("end of iteration");
    }
}

impl Watcher {
    /// Run sampling cycles until the surrounding task is dropped.
    pub async fn run(&self) {
        let window = self.window();
        info!(
            validation_keys = self.counts().total,
            window_secs = window.as_secs(),
            "starting to watch keys"
        );

        run_every(window, move || self.run_cycle()).await
    }

    /// Publish coverage counts, then fetch and publish every key once.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let granularity = self.config.granularity();

        let counts = self.counts();
        self.metrics.set_monitored_keys(&counts);

        info!(
            total = counts.total,
            labels = counts.per_label.len(),
            granularity = granularity.as_str(),
            "📡 Sampling cycle starting"
        );

        let mut report = CycleReport::default();

        for (label, keys) in &self.keys {
            for resolved in keys {
                report.attempted += 1;

                info!(
                    label = %label,
                    validation_key = %resolved.key,
                    validation_key_index = resolved.index,
                    "fetching statistics about key"
                );

                let sample = match self.client.fetch_effectiveness(&resolved.key, granularity).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(
                            label = %label,
                            validation_key = %resolved.key,
                            validation_key_index = resolved.index,
                            "unable to fetch statistics about key, skipped: {}",
                            e
                        );
                        report.failed += 1;
                        continue;
                    }
                };

                info!(
                    label = %label,
                    validation_key = %resolved.key,
                    uptime = ?sample.uptime,
                    avg_correctness = ?sample.avg_correctness,
                    attester_effectiveness = ?sample.attester_effectiveness,
                    proposer_effectiveness = ?sample.proposer_effectiveness,
                    validator_effectiveness = ?sample.validator_effectiveness,
                    rewards = ?sample.rewards,
                    inclusion_delay = ?sample.inclusion_delay,
                    "fetched statistics about key from rated network"
                );

                self.metrics
                    .record_sample(label, resolved.key.as_str(), &sample);
                report.succeeded += 1;
            }
        }

        report.elapsed = started.elapsed();

        info!(
            total = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_secs = report.elapsed.as_secs(),
            "📡 Sampling cycle complete"
        );

        report
    }
}
