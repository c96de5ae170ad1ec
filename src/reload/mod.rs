//! Dynamic module reloading.
//!
//! A [`ConfigReloader`] periodically scans a glob of fragment files. When
//! anything changed, it rebuilds the set of candidate modules, diffs their
//! config hashes against the running set and starts or stops only the
//! difference. A module whose config did not change keeps running untouched.

mod fragment;
mod running;
mod watcher;

pub use fragment::load_fragment;
pub use running::RunningRegistry;
pub use watcher::GlobWatcher;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use metricwatch_sdk::{
    new_module_wrappers, ModuleHash, ModuleRunner, ModuleWrapper, Publisher, Registry, Shutdown,
    Stats,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::settings::ReloadSettings;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to load {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid fragment {}: {reason}", .path.display())]
    InvalidFragment { path: PathBuf, reason: String },
}

/// What one reload cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub started: usize,
    pub stopped: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// The start/stop delta between candidates and running modules.
#[derive(Debug, Default)]
pub struct Plan {
    pub start: Vec<ModuleWrapper>,
    pub stop: Vec<(ModuleHash, Arc<ModuleRunner>)>,
    pub unchanged: usize,
}

/// Diff candidate modules against the running set.
///
/// Running modules whose hash is among the candidates are kept; every other
/// running module is stopped. Candidates with a new hash are started once,
/// duplicates are dropped.
pub fn plan(candidates: Vec<ModuleWrapper>, running: HashMap<ModuleHash, Arc<ModuleRunner>>) -> Plan {
    let mut stop = running;
    let mut seen = HashSet::new();
    let mut plan = Plan::default();

    for wrapper in candidates {
        let hash = wrapper.hash().clone();
        if !seen.insert(hash.clone()) {
            debug!(module = %wrapper.name(), hash = %hash.short(), "ignoring duplicate module config");
            continue;
        }
        if stop.remove(&hash).is_some() {
            plan.unchanged += 1;
            continue;
        }
        plan.start.push(wrapper);
    }

    plan.stop = stop.into_iter().collect();
    plan
}

struct Inner {
    settings: ReloadSettings,
    registry: Arc<Registry>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<Stats>,
    running: Arc<RunningRegistry>,
    watcher: tokio::sync::Mutex<GlobWatcher>,
}

/// Watches fragment files and keeps the running modules in sync with them.
pub struct ConfigReloader {
    inner: Arc<Inner>,
    task: Mutex<Option<(Shutdown, JoinHandle<()>)>>,
}

impl ConfigReloader {
    pub fn new(
        settings: ReloadSettings,
        registry: Arc<Registry>,
        publisher: Arc<dyn Publisher>,
        stats: Arc<Stats>,
    ) -> Self {
        let watcher = GlobWatcher::new(settings.path.clone());
        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                publisher,
                stats,
                running: Arc::new(RunningRegistry::new()),
                watcher: tokio::sync::Mutex::new(watcher),
            }),
            task: Mutex::new(None),
        }
    }

    /// Modules this reloader started and has not stopped yet.
    pub fn running(&self) -> &Arc<RunningRegistry> {
        &self.inner.running
    }

    /// Spawn the scan loop. Calling it again while running does nothing.
    pub fn run(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let (shutdown, mut done) = Shutdown::new();
        let inner = self.inner.clone();

        info!(
            path = %inner.settings.path,
            period = ?inner.settings.period,
            "config reloader started"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.settings.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = done.wait() => break,
                    _ = ticker.tick() => {}
                }

                if let Err(err) = inner.reload().await {
                    error!(error = %err, "config reload failed");
                }
            }

            inner.stop_all().await;
            info!("config reloader stopped");
        });

        *task = Some((shutdown, handle));
    }

    /// Stop the scan loop and every module it started.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        match task {
            Some((shutdown, handle)) => {
                shutdown.trigger();
                if let Err(err) = handle.await {
                    warn!(error = %err, "config reloader task ended abnormally");
                    self.inner.stop_all().await;
                }
            }
            None => self.inner.stop_all().await,
        }
    }

    /// Run one scan/diff/apply cycle. `None` when no fragment changed.
    pub async fn reload(&self) -> Result<Option<ReloadSummary>, ReloadError> {
        self.inner.reload().await
    }
}

impl Inner {
    async fn reload(&self) -> Result<Option<ReloadSummary>, ReloadError> {
        self.stats.record_reload();

        let Some(paths) = self.watcher.lock().await.scan()? else {
            return Ok(None);
        };

        let mut raws = Vec::new();
        for path in &paths {
            match load_fragment(path) {
                Ok(mut modules) => raws.append(&mut modules),
                Err(err) => error!(error = %err, "skipping config fragment"),
            }
        }

        let wrapped = new_module_wrappers(&raws, &self.registry, &self.stats);
        for err in &wrapped.errors {
            error!(error = %err, "skipping module config");
        }

        let plan = plan(wrapped.wrappers, self.running.copy_list());
        let mut summary = ReloadSummary {
            stopped: plan.stop.len(),
            unchanged: plan.unchanged,
            ..Default::default()
        };

        let mut stops = Vec::with_capacity(plan.stop.len());
        for (hash, runner) in plan.stop {
            stops.push(self.stop_runner(hash, runner));
        }
        join_all(stops).await;

        let mut starts = Vec::with_capacity(plan.start.len());
        for wrapper in plan.start {
            starts.push(self.start_wrapper(wrapper));
        }
        for started in join_all(starts).await {
            if started {
                summary.started += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            files = paths.len(),
            started = summary.started,
            stopped = summary.stopped,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "applied config changes"
        );
        Ok(Some(summary))
    }

    /// Start a new module; it is registered only once running.
    async fn start_wrapper(&self, wrapper: ModuleWrapper) -> bool {
        let hash = wrapper.hash().clone();
        let runner = Arc::new(ModuleRunner::new(
            wrapper,
            self.publisher.clone(),
            self.stats.clone(),
        ));
        match runner.start().await {
            Ok(()) => {
                self.running.add(hash, runner);
                true
            }
            Err(err) => {
                error!(
                    module = %runner.info().name,
                    hash = %hash.short(),
                    error = %err,
                    "failed to start module"
                );
                false
            }
        }
    }

    /// Stop a module; it is unregistered only once fully stopped.
    async fn stop_runner(&self, hash: ModuleHash, runner: Arc<ModuleRunner>) {
        runner.stop().await;
        self.running.remove(&hash);
    }

    async fn stop_all(&self) {
        let mut stops = Vec::new();
        for (hash, runner) in self.running.copy_list() {
            stops.push(self.stop_runner(hash, runner));
        }
        join_all(stops).await;
    }
}
