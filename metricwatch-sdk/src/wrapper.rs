//! Running wrappers around modules and their metricsets.
//!
//! A [`ModuleWrapper`] owns every metricset instance of one configured
//! module. Starting it spawns one fetch worker per metricset, all writing to
//! a single bounded channel that closes once the last worker has exited.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use metricwatch_types::{Event, EventMetadata, Payload};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::config::{is_enabled, ModuleConfig, ModuleHash};
use crate::error::{Error, FetchError};
use crate::event_builder::EventBuilder;
use crate::filter::FilterChain;
use crate::metricset::{MetricSet, Module};
use crate::registry::Registry;
use crate::shutdown::Done;
use crate::stats::{GaugeGuard, MetricSetCounters, Stats};

/// Immutable metadata of a module, shared by all of its metricset workers.
#[derive(Debug)]
pub struct ModuleInfo {
    pub name: String,
    pub config: ModuleConfig,
    pub hash: ModuleHash,
    pub filters: FilterChain,
}

impl ModuleInfo {
    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn timeout(&self) -> Duration {
        self.config.effective_timeout()
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.config.metadata
    }
}

/// A configured module ready to be started.
#[derive(Debug)]
pub struct ModuleWrapper {
    info: Arc<ModuleInfo>,
    metricsets: Vec<MetricSetWrapper>,
}

impl ModuleWrapper {
    /// Wrap a module and its metricsets. Fails if the filters do not compile.
    pub fn new(module: Module, metricsets: Vec<MetricSet>, stats: &Arc<Stats>) -> Result<Self, Error> {
        module.config.validate()?;
        let filters = FilterChain::compile(&module.config.filters)?;
        let hash = module.config.hash();

        let info = Arc::new(ModuleInfo {
            name: module.name,
            config: module.config,
            hash,
            filters,
        });

        let metricsets = metricsets
            .into_iter()
            .map(|metricset| MetricSetWrapper::new(metricset, info.clone(), stats.clone()))
            .collect();

        Ok(Self { info, metricsets })
    }

    /// Parse a raw config and build the module through the registry.
    pub fn from_config(raw: &Value, registry: &Registry, stats: &Arc<Stats>) -> Result<Self, Error> {
        let config = ModuleConfig::from_value(raw)?;
        let (module, metricsets) = registry.create(&config)?;
        Self::new(module, metricsets, stats)
    }

    pub fn hash(&self) -> &ModuleHash {
        &self.info.hash
    }

    pub fn info(&self) -> &Arc<ModuleInfo> {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn metricsets(&self) -> &[MetricSetWrapper] {
        &self.metricsets
    }

    /// Spawn one worker per metricset and return their shared output.
    ///
    /// Workers run until `done` resolves. The receiver yields `None` only
    /// after every worker has exited.
    pub fn start(self, done: Done) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(1);

        debug!(
            module = %self.info.name,
            hash = %self.info.hash.short(),
            metricsets = self.metricsets.len(),
            "starting module"
        );

        for metricset in self.metricsets {
            let guard = metricset.stats.worker_guard();
            tokio::spawn(metricset.run(done.clone(), tx.clone(), guard));
        }

        rx
    }
}

/// One metricset instance plus everything its worker needs.
#[derive(Debug)]
pub struct MetricSetWrapper {
    metricset: MetricSet,
    module: Arc<ModuleInfo>,
    counters: Arc<MetricSetCounters>,
    stats: Arc<Stats>,
}

impl MetricSetWrapper {
    fn new(metricset: MetricSet, module: Arc<ModuleInfo>, stats: Arc<Stats>) -> Self {
        let counters = stats.metricset(&metricset.module, &metricset.name);
        Self {
            metricset,
            module,
            counters,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.metricset.name
    }

    pub fn host(&self) -> &str {
        &self.metricset.host
    }

    pub fn id(&self) -> String {
        self.metricset.id()
    }

    pub fn counters(&self) -> &Arc<MetricSetCounters> {
        &self.counters
    }

    async fn run(mut self, mut done: Done, out: mpsc::Sender<Event>, guard: GaugeGuard) {
        let mut ticker = tokio::time::interval(self.module.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            module = %self.metricset.module,
            metricset = %self.metricset.name,
            host = %self.metricset.host,
            period = ?self.module.period(),
            "metricset worker started"
        );

        // The first tick completes immediately.
        'worker: loop {
            tokio::select! {
                biased;
                _ = done.wait() => break 'worker,
                _ = ticker.tick() => {}
            }

            let events = tokio::select! {
                biased;
                _ = done.wait() => break 'worker,
                events = self.fetch() => events,
            };

            for event in events {
                tokio::select! {
                    biased;
                    _ = done.wait() => break 'worker,
                    sent = out.send(event) => {
                        if sent.is_err() {
                            break 'worker;
                        }
                        self.counters.record_events(1);
                    }
                }
            }
        }

        debug!(metricset = %self.id(), "metricset worker stopped");
        drop(guard);
        drop(out);
    }

    /// Run one fetch and turn its outcome into events.
    async fn fetch(&mut self) -> Vec<Event> {
        let start_time = Utc::now();
        let started = Instant::now();
        let timeout = self.module.timeout();

        let fetch = AssertUnwindSafe(self.metricset.fetcher.fetch()).catch_unwind();
        let result = match tokio::time::timeout(timeout, fetch).await {
            Err(_) => Err(FetchError::Timeout),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(
                    module = %self.metricset.module,
                    metricset = %self.metricset.name,
                    host = %self.metricset.host,
                    panic = %message,
                    "metricset panicked during fetch"
                );
                Err(FetchError::Panicked(message))
            }
            Ok(Ok(result)) => result,
        };
        let fetch_duration = started.elapsed();

        match result {
            Ok(payloads) => {
                self.counters.record_success();
                payloads
                    .into_iter()
                    .filter_map(|payload| self.build(start_time, fetch_duration, Some(payload), None))
                    .collect()
            }
            Err(err) => {
                self.counters.record_failure();
                warn!(
                    module = %self.metricset.module,
                    metricset = %self.metricset.name,
                    host = %self.metricset.host,
                    error = %err,
                    "fetch failed"
                );
                self.build(start_time, fetch_duration, None, Some(err.to_string()))
                    .into_iter()
                    .collect()
            }
        }
    }

    fn build(
        &self,
        start_time: chrono::DateTime<Utc>,
        fetch_duration: Duration,
        payload: Option<Payload>,
        fetch_error: Option<String>,
    ) -> Option<Event> {
        let metadata = self.module.metadata();
        let builder = EventBuilder {
            module: &self.metricset.module,
            metricset: &self.metricset.name,
            host: &self.metricset.host,
            start_time,
            fetch_duration,
            payload,
            fetch_error,
            filters: &self.module.filters,
            metadata: (!metadata.is_empty()).then_some(metadata),
        };

        match builder.build() {
            Ok(event) => event,
            Err(err) => {
                error!(metricset = %self.id(), error = %err, "dropping event");
                None
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Result of wrapping a batch of module configs.
#[derive(Debug, Default)]
pub struct Wrapped {
    pub wrappers: Vec<ModuleWrapper>,
    pub errors: Vec<Error>,
}

impl Wrapped {
    /// Fails only when nothing usable was built and something went wrong.
    pub fn into_result(self) -> Result<Vec<ModuleWrapper>, Error> {
        if self.wrappers.is_empty() {
            if let Some(err) = Error::from_many(self.errors) {
                return Err(err);
            }
        }
        Ok(self.wrappers)
    }
}

/// Wrap every enabled config, collecting failures instead of stopping.
pub fn new_module_wrappers(raws: &[Value], registry: &Registry, stats: &Arc<Stats>) -> Wrapped {
    let mut wrapped = Wrapped::default();
    for raw in raws {
        if !is_enabled(raw) {
            debug!("skipping disabled module config");
            continue;
        }
        match ModuleWrapper::from_config(raw, registry, stats) {
            Ok(wrapper) => wrapped.wrappers.push(wrapper),
            Err(err) => wrapped.errors.push(err),
        }
    }
    wrapped
}
