//! Engine statistics.
//!
//! Counts what happened to every comment between admission and retirement,
//! plus an admission rate timeseries bucketed over playback time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::message::millis;
use crate::queue::QueueCounters;

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Comments admitted through `offer`
    pub offered: u64,
    /// Comments `offer` turned away because the queue was full
    pub rejected: u64,
    /// Comments admitted through `submit`
    pub submitted: u64,
    /// Submissions that gave up before admission
    pub cancelled: u64,
    /// Comments given a lane or slot
    pub placed: u64,
    /// Placed comments whose entry was held back
    pub delayed: u64,
    /// Comments discarded by the overload policy or for lack of rows
    pub dropped: u64,
    /// Comments skipped because their location is disabled
    pub filtered: u64,
    /// Comments that left the screen
    pub retired: u64,
    /// Highest number of live presentations seen at once
    pub peak_live: usize,
    /// Longest hold-back applied to a placed comment
    #[serde(rename = "max_entry_delay_ms", with = "millis")]
    pub max_entry_delay: Duration,
    /// Placed comments per playback bucket, ordered by bucket start
    pub rate_timeseries: Vec<RateDataPoint>,
}

impl EngineStatistics {
    /// Comments that made it into the queue.
    pub fn admitted(&self) -> u64 {
        self.offered + self.submitted
    }
}

/// A rate timeseries data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDataPoint {
    /// Start of the bucket in playback time
    #[serde(rename = "start_ms", with = "millis")]
    pub start: Duration,
    pub count: u64,
}

/// Accumulates engine counters. Owned by the frame driver.
#[derive(Debug)]
pub struct StatisticsAggregator {
    placed: u64,
    delayed: u64,
    dropped: u64,
    filtered: u64,
    retired: u64,
    peak_live: usize,
    max_entry_delay: Duration,
    /// Placement count per bucket start. Seeks can revisit earlier buckets.
    rate_buckets: BTreeMap<Duration, u64>,
    bucket: Duration,
}

impl StatisticsAggregator {
    /// Create an aggregator with 10 second buckets.
    pub fn new() -> Self {
        Self::with_bucket(Duration::from_secs(10))
    }

    pub fn with_bucket(bucket: Duration) -> Self {
        Self {
            placed: 0,
            delayed: 0,
            dropped: 0,
            filtered: 0,
            retired: 0,
            peak_live: 0,
            max_entry_delay: Duration::ZERO,
            rate_buckets: BTreeMap::new(),
            bucket: bucket.max(Duration::from_millis(1)),
        }
    }

    /// Record a placement at playback time `at`.
    pub fn record_placed(&mut self, at: Duration, delay: Duration) {
        self.placed += 1;
        if !delay.is_zero() {
            self.delayed += 1;
            self.max_entry_delay = self.max_entry_delay.max(delay);
        }
        self.update_rate_bucket(at);
    }

    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    pub fn record_filtered(&mut self) {
        self.filtered += 1;
    }

    pub fn record_retired(&mut self, count: usize) {
        self.retired += count as u64;
    }

    pub fn observe_live(&mut self, live: usize) {
        self.peak_live = self.peak_live.max(live);
    }

    fn update_rate_bucket(&mut self, at: Duration) {
        let bucket_start = self.bucket_start(at);
        *self.rate_buckets.entry(bucket_start).or_insert(0) += 1;
    }

    fn bucket_start(&self, at: Duration) -> Duration {
        let bucket_ms = self.bucket.as_millis();
        let start_ms = at.as_millis() / bucket_ms * bucket_ms;
        Duration::from_millis(start_ms as u64)
    }

    /// Current statistics, merged with the ingestion queue counters.
    pub fn snapshot(&self, queue: QueueCounters) -> EngineStatistics {
        let rate_timeseries = self
            .rate_buckets
            .iter()
            .map(|(&start, &count)| RateDataPoint { start, count })
            .collect();

        EngineStatistics {
            offered: queue.offered,
            rejected: queue.rejected,
            submitted: queue.submitted,
            cancelled: queue.cancelled,
            placed: self.placed,
            delayed: self.delayed,
            dropped: self.dropped,
            filtered: self.filtered,
            retired: self.retired,
            peak_live: self.peak_live,
            max_entry_delay: self.max_entry_delay,
            rate_timeseries,
        }
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
