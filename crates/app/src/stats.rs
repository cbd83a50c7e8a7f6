// Copyright 2025 svckit contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named stats and queue depth sampling.
//!
//! Counters are plain `f64` values keyed by name. Queues registered with
//! [`StatsRegistry::register_queue`] are sampled on every
//! [`gather`](StatsRegistry::gather), which also resets the counters and
//! pushes the snapshot onto a bounded history. The same values are exported
//! as prometheus gauges on a registry owned by this instance.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;
use prometheus::{Encoder, GaugeVec, IntGaugeVec, Opts, Registry, TextEncoder};
use snafu::ResultExt;
use svckit_queue::SizedQueue;
use tracing::debug;

use crate::error::{MetricsSnafu, Result};

/// Stat carrying seconds since the registry was created.
pub const UPTIME_STAT: &str = "uptime";

pub type SharedQueue = Arc<dyn SizedQueue + Send + Sync>;

pub struct StatsRegistry {
    inner:       Mutex<StatsInner>,
    started:     Instant,
    history_len: usize,
    registry:    Registry,
    queue_depth: IntGaugeVec,
    stat_value:  GaugeVec,
}

#[derive(Default)]
struct StatsInner {
    values:   BTreeMap<String, f64>,
    queues:   BTreeMap<String, SharedQueue>,
    /// Newest snapshot first.
    gathered: BTreeMap<String, VecDeque<f64>>,
}

impl StatsRegistry {
    pub fn new(history_len: usize) -> Result<Self> {
        let registry = Registry::new();
        let queue_depth = IntGaugeVec::new(
            Opts::new("svckit_queue_depth", "Items held by a queue at the last gather"),
            &["queue"],
        )
        .context(MetricsSnafu)?;
        let stat_value = GaugeVec::new(
            Opts::new("svckit_stat", "Named stat value at the last gather"),
            &["stat"],
        )
        .context(MetricsSnafu)?;
        registry
            .register(Box::new(queue_depth.clone()))
            .context(MetricsSnafu)?;
        registry
            .register(Box::new(stat_value.clone()))
            .context(MetricsSnafu)?;

        Ok(Self {
            inner: Mutex::new(StatsInner::default()),
            started: Instant::now(),
            history_len: history_len.max(1),
            registry,
            queue_depth,
            stat_value,
        })
    }

    pub fn set(&self, id: &str, value: f64) { self.inner.lock().values.insert(id.to_string(), value); }

    pub fn increment(&self, id: &str, by: f64) { *self.inner.lock().values.entry(id.to_string()).or_default() += by; }

    pub fn decrement(&self, id: &str, by: f64) { *self.inner.lock().values.entry(id.to_string()).or_default() -= by; }

    /// Samples `queue` under `id` from now on. Re-registering replaces the
    /// previous source.
    pub fn register_queue(&self, id: &str, queue: SharedQueue) {
        debug!(queue = id, "Registered queue for stats");
        self.inner.lock().queues.insert(id.to_string(), queue);
    }

    /// Live values: counters, uptime and current queue sizes.
    #[must_use]
    pub fn current(&self) -> BTreeMap<String, f64> {
        let inner = self.inner.lock();
        let mut snapshot = inner.values.clone();
        snapshot.insert(UPTIME_STAT.to_string(), self.uptime());
        for (id, queue) in &inner.queues {
            snapshot.insert(id.clone(), queue.size() as f64);
        }
        snapshot
    }

    /// Records a snapshot into the history and the prometheus gauges, then
    /// resets the counters to zero. Returns the snapshot.
    pub fn gather(&self) -> BTreeMap<String, f64> {
        let mut inner = self.inner.lock();
        let mut snapshot = BTreeMap::new();

        inner.values.insert(UPTIME_STAT.to_string(), self.uptime());
        for (id, value) in &mut inner.values {
            snapshot.insert(id.clone(), *value);
            self.stat_value.with_label_values(&[id.as_str()]).set(*value);
            *value = 0.0;
        }
        for (id, queue) in &inner.queues {
            let size = queue.size();
            snapshot.insert(id.clone(), size as f64);
            self.queue_depth
                .with_label_values(&[id.as_str()])
                .set(i64::try_from(size).unwrap_or(i64::MAX));
        }

        for (id, value) in &snapshot {
            let history = inner.gathered.entry(id.clone()).or_default();
            history.push_front(*value);
            history.truncate(self.history_len);
        }

        debug!(stats = snapshot.len(), "Gathered stats");
        snapshot
    }

    /// Most recent gathered value of every stat.
    #[must_use]
    pub fn last_gathered(&self) -> BTreeMap<String, f64> {
        self.inner
            .lock()
            .gathered
            .iter()
            .filter_map(|(id, history)| history.front().map(|v| (id.clone(), *v)))
            .collect()
    }

    /// Gathered values per stat, newest first, at most `history_len` each.
    #[must_use]
    pub fn history(&self) -> BTreeMap<String, Vec<f64>> {
        self.inner
            .lock()
            .gathered
            .iter()
            .map(|(id, history)| (id.clone(), history.iter().copied().collect()))
            .collect()
    }

    pub const fn registry(&self) -> &Registry { &self.registry }

    /// Prometheus text exposition of the last gather.
    pub fn encode_text(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context(MetricsSnafu)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn uptime(&self) -> f64 { self.started.elapsed().as_secs_f64().floor() }
}

impl std::fmt::Debug for StatsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StatsRegistry")
            .field("values", &inner.values)
            .field("queues", &inner.queues.keys().collect::<Vec<_>>())
            .field("history_len", &self.history_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedQueue(AtomicUsize);

    impl SizedQueue for FixedQueue {
        fn size(&self) -> usize { self.0.load(Ordering::SeqCst) }
    }

    #[test]
    fn test_counters() {
        let stats = StatsRegistry::new(3).unwrap();
        stats.increment("requests", 1.0);
        stats.increment("requests", 2.0);
        stats.decrement("inflight", 1.0);
        stats.set("threads", 8.0);

        let current = stats.current();
        assert_eq!(current["requests"], 3.0);
        assert_eq!(current["inflight"], -1.0);
        assert_eq!(current["threads"], 8.0);
        assert!(current.contains_key(UPTIME_STAT));
    }

    #[test]
    fn test_gather_resets_counters_and_samples_queues() {
        let stats = StatsRegistry::new(3).unwrap();
        let queue = Arc::new(FixedQueue(AtomicUsize::new(5)));
        stats.register_queue("outbound", queue.clone());
        stats.increment("sent", 4.0);

        let first = stats.gather();
        assert_eq!(first["sent"], 4.0);
        assert_eq!(first["outbound"], 5.0);
        assert_eq!(stats.current()["sent"], 0.0);

        queue.0.store(2, Ordering::SeqCst);
        stats.gather();
        assert_eq!(stats.last_gathered()["outbound"], 2.0);
        assert_eq!(stats.last_gathered()["sent"], 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let stats = StatsRegistry::new(2).unwrap();
        for i in 0..5 {
            stats.set("n", f64::from(i));
            stats.gather();
        }
        assert_eq!(stats.history()["n"], vec![4.0, 3.0]);
    }

    #[test]
    fn test_prometheus_export() {
        let stats = StatsRegistry::new(2).unwrap();
        stats.register_queue("jobs", Arc::new(FixedQueue(AtomicUsize::new(7))));
        stats.gather();

        let text = stats.encode_text().unwrap();
        assert!(text.contains("svckit_queue_depth{queue=\"jobs\"} 7"));
    }
}
