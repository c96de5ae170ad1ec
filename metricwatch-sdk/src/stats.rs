//! Self-monitoring counters.
//!
//! A [`Stats`] value is created once by the agent and passed explicitly to
//! everything that records into it. Per-metricset buckets are created on
//! first use and shared by every worker of that `(module, metricset)` pair.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// Fetch outcome counters for one `(module, metricset)` pair.
#[derive(Debug, Default)]
pub struct MetricSetCounters {
    pub success: AtomicU64,
    pub failures: AtomicU64,
    pub events: AtomicU64,
}

impl MetricSetCounters {
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events(&self, count: u64) {
        self.events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
        }
    }
}

/// Registry of every counter the scheduler and reloader maintain.
#[derive(Debug, Default)]
pub struct Stats {
    metricsets: RwLock<BTreeMap<String, BTreeMap<String, Arc<MetricSetCounters>>>>,
    config_reloads: AtomicU64,
    module_starts: AtomicU64,
    module_stops: AtomicU64,
    active_workers: Arc<AtomicU64>,
    active_pumps: Arc<AtomicU64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the bucket for a `(module, metricset)` pair.
    pub fn metricset(&self, module: &str, metricset: &str) -> Arc<MetricSetCounters> {
        // Fast path: check if it exists
        {
            let buckets = self.metricsets.read();
            if let Some(counters) = buckets.get(module).and_then(|sets| sets.get(metricset)) {
                return counters.clone();
            }
        }

        // Slow path: entry() re-checks under the write lock
        let mut buckets = self.metricsets.write();
        buckets
            .entry(module.to_string())
            .or_default()
            .entry(metricset.to_string())
            .or_insert_with(|| Arc::new(MetricSetCounters::default()))
            .clone()
    }

    pub fn record_reload(&self) {
        self.config_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_module_start(&self) {
        self.module_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_module_stop(&self) {
        self.module_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn config_reloads(&self) -> u64 {
        self.config_reloads.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> u64 {
        self.active_workers.load(Ordering::Acquire)
    }

    pub fn active_pumps(&self) -> u64 {
        self.active_pumps.load(Ordering::Acquire)
    }

    /// Mark a fetch worker as live until the guard is dropped.
    pub fn worker_guard(&self) -> GaugeGuard {
        GaugeGuard::new(self.active_workers.clone())
    }

    /// Mark a publish pump as live until the guard is dropped.
    pub fn pump_guard(&self) -> GaugeGuard {
        GaugeGuard::new(self.active_pumps.clone())
    }

    /// Collect every counter into a serializable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        let metricsets = self
            .metricsets
            .read()
            .iter()
            .flat_map(|(module, sets)| {
                sets.iter().map(move |(metricset, counters)| MetricSetSnapshot {
                    module: module.clone(),
                    metricset: metricset.clone(),
                    counters: counters.snapshot(),
                })
            })
            .collect();

        StatsSnapshot {
            metricsets,
            config_reloads: self.config_reloads.load(Ordering::Relaxed),
            module_starts: self.module_starts.load(Ordering::Relaxed),
            module_stops: self.module_stops.load(Ordering::Relaxed),
            active_workers: self.active_workers(),
            active_pumps: self.active_pumps(),
        }
    }
}

/// Decrements its gauge when dropped.
///
/// Holding the guard inside a spawned task keeps the gauge accurate even
/// when the task panics or is aborted.
#[must_use = "the gauge is decremented as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GaugeGuard {
    gauge: Arc<AtomicU64>,
}

impl GaugeGuard {
    fn new(gauge: Arc<AtomicU64>) -> Self {
        gauge.fetch_add(1, Ordering::AcqRel);
        Self { gauge }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CounterSnapshot {
    pub success: u64,
    pub failures: u64,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSetSnapshot {
    pub module: String,
    pub metricset: String,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub metricsets: Vec<MetricSetSnapshot>,
    pub config_reloads: u64,
    pub module_starts: u64,
    pub module_stops: u64,
    pub active_workers: u64,
    pub active_pumps: u64,
}

impl StatsSnapshot {
    /// Counters of one `(module, metricset)` pair, if it ever recorded.
    pub fn get(&self, module: &str, metricset: &str) -> Option<CounterSnapshot> {
        self.metricsets
            .iter()
            .find(|s| s.module == module && s.metricset == metricset)
            .map(|s| s.counters)
    }
}
