//! Binds a module's event stream to a publisher client.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use metricwatch_types::Event;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ModuleHash;
use crate::error::Error;
use crate::publisher::{Client, Publisher};
use crate::shutdown::{Done, Shutdown};
use crate::stats::{GaugeGuard, Stats};
use crate::wrapper::{ModuleInfo, ModuleWrapper};

/// Upper bound on flushing a client once the module stopped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

enum RunnerState {
    Idle(ModuleWrapper),
    Running {
        shutdown: Shutdown,
        pump: JoinHandle<()>,
    },
    Stopped,
}

/// Runs one module and forwards its events to a publisher.
///
/// # Example
///
/// ```rust,no_run
/// use metricwatch_sdk::{ModuleRunner, ModuleWrapper, Output, Registry, Stats};
/// use std::sync::Arc;
///
/// # async fn run(registry: Registry) -> Result<(), metricwatch_sdk::Error> {
/// let stats = Arc::new(Stats::new());
/// let raw = serde_json::json!({ "module": "agent", "metricsets": ["uptime"] });
/// let wrapper = ModuleWrapper::from_config(&raw, &registry, &stats)?;
///
/// let runner = ModuleRunner::new(wrapper, Arc::new(Output::Stdout), stats);
/// runner.start().await?;
/// // ...
/// runner.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ModuleRunner {
    info: Arc<ModuleInfo>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<Stats>,
    state: Mutex<RunnerState>,
}

impl ModuleRunner {
    pub fn new(wrapper: ModuleWrapper, publisher: Arc<dyn Publisher>, stats: Arc<Stats>) -> Self {
        Self {
            info: wrapper.info().clone(),
            publisher,
            stats,
            state: Mutex::new(RunnerState::Idle(wrapper)),
        }
    }

    pub fn hash(&self) -> &ModuleHash {
        &self.info.hash
    }

    pub fn info(&self) -> &Arc<ModuleInfo> {
        &self.info
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, RunnerState::Running { .. })
    }

    /// Connect a client, start the fetch workers and the publish pump.
    ///
    /// A runner starts at most once. If the publisher cannot connect, the
    /// runner stays idle and the error is returned.
    pub async fn start(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let wrapper = match mem::replace(&mut *state, RunnerState::Stopped) {
            RunnerState::Idle(wrapper) => wrapper,
            other => {
                *state = other;
                return Err(Error::AlreadyStarted(self.info.name.clone()));
            }
        };

        let client = match self.publisher.connect(&self.info).await {
            Ok(client) => client,
            Err(err) => {
                *state = RunnerState::Idle(wrapper);
                return Err(err);
            }
        };

        let (shutdown, done) = Shutdown::new();
        let pump_done = shutdown.done();
        let events = wrapper.start(done);
        let guard = self.stats.pump_guard();
        let pump = tokio::spawn(pump(events, client, pump_done, guard, self.info.clone()));

        *state = RunnerState::Running { shutdown, pump };
        self.stats.record_module_start();

        info!(module = %self.info.name, hash = %self.info.hash.short(), "module started");
        Ok(())
    }

    /// Stop the workers and wait until the client is closed.
    ///
    /// Safe to call more than once; stopping an idle runner discards it.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        match mem::replace(&mut *state, RunnerState::Stopped) {
            RunnerState::Running { shutdown, pump } => {
                shutdown.trigger();
                if let Err(err) = pump.await {
                    warn!(module = %self.info.name, error = %err, "publish pump ended abnormally");
                }
                self.stats.record_module_stop();
                info!(module = %self.info.name, hash = %self.info.hash.short(), "module stopped");
            }
            RunnerState::Idle(_) => {
                debug!(module = %self.info.name, "discarding module that never started");
            }
            RunnerState::Stopped => {}
        }
    }
}

impl fmt::Debug for ModuleRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRunner")
            .field("module", &self.info.name)
            .field("hash", &self.info.hash)
            .finish_non_exhaustive()
    }
}

/// Publish until the module is stopped or every worker has exited, then
/// close the client.
///
/// A publish still pending when `done` fires is abandoned, and events left
/// in the channel are discarded while the workers wind down.
async fn pump(
    mut events: mpsc::Receiver<Event>,
    mut client: Box<dyn Client>,
    mut done: Done,
    guard: GaugeGuard,
    module: Arc<ModuleInfo>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = done.wait() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = done.wait() => {
                debug!(module = %module.name, "abandoning pending publish");
                break;
            }
            _ = client.publish(event) => {}
        }
    }

    // Workers observe the same signal, so the channel closes promptly.
    while events.recv().await.is_some() {}

    match tokio::time::timeout(CLOSE_TIMEOUT, client.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(module = %module.name, error = %err, "failed to close publisher client")
        }
        Err(_) => warn!(module = %module.name, "timed out closing publisher client"),
    }
    drop(guard);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Output;
    use crate::wrapper::tests::fake_registry;
    use serde_json::json;

    fn runner(output: Output, stats: &Arc<Stats>, period: &str) -> ModuleRunner {
        let raw = json!({
            "module": "fake",
            "metricsets": ["status"],
            "hosts": ["alpha", "beta"],
            "period": period,
        });
        let wrapper = ModuleWrapper::from_config(&raw, &fake_registry(), stats).unwrap();
        ModuleRunner::new(wrapper, Arc::new(output), stats.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_events_until_stopped() {
        let stats = Arc::new(Stats::new());
        let (output, mut rx) = Output::channel(64);
        let runner = runner(output, &stats, "10ms");

        assert!(!runner.is_running().await);
        runner.start().await.unwrap();
        assert!(runner.is_running().await);
        assert_eq!(stats.active_pumps(), 1);

        let mut hosts = Vec::new();
        for _ in 0..4 {
            let event = rx.recv().await.unwrap();
            hosts.push(event.host.unwrap());
        }
        assert!(hosts.iter().any(|h| h == "alpha"));
        assert!(hosts.iter().any(|h| h == "beta"));

        runner.stop().await;
        assert!(!runner.is_running().await);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.active_workers, 0);
        assert_eq!(snapshot.active_pumps, 0);
        assert_eq!(snapshot.module_starts, 1);
        assert_eq!(snapshot.module_stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_start_happens_once() {
        let stats = Arc::new(Stats::new());
        let (output, _rx) = Output::channel(64);
        let runner = runner(output, &stats, "10ms");

        runner.start().await.unwrap();
        assert!(matches!(runner.start().await, Err(Error::AlreadyStarted(_))));

        runner.stop().await;
        runner.stop().await;
        assert_eq!(stats.snapshot().module_stops, 1);
        assert!(matches!(runner.start().await, Err(Error::AlreadyStarted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_does_not_wait_for_a_stalled_consumer() {
        let stats = Arc::new(Stats::new());
        // The receiver is kept alive but never read, so publishes block.
        let (output, _rx) = Output::channel(1);
        let runner = runner(output, &stats, "10ms");

        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), runner.stop())
            .await
            .expect("stop must not hang on a blocked publish");
        assert!(!runner.is_running().await);
        assert_eq!(stats.active_workers(), 0);
        assert_eq!(stats.active_pumps(), 0);
        assert_eq!(stats.snapshot().module_stops, 1);
    }

    #[tokio::test]
    async fn stopping_an_idle_runner_spawns_nothing() {
        let stats = Arc::new(Stats::new());
        let (output, _rx) = Output::channel(1);
        let runner = runner(output, &stats, "10ms");

        runner.stop().await;
        assert!(!runner.is_running().await);
        assert_eq!(stats.active_workers(), 0);
        assert_eq!(stats.snapshot().module_stops, 0);
    }

    #[tokio::test]
    async fn connect_failure_leaves_runner_idle() {
        let stats = Arc::new(Stats::new());
        let dir = tempfile::tempdir().unwrap();
        let output = Output::file(dir.path().join("missing").join("events.ndjson"));
        let runner = runner(output, &stats, "10ms");

        assert!(matches!(runner.start().await, Err(Error::Publisher(_))));
        assert!(!runner.is_running().await);
        assert_eq!(stats.active_workers(), 0);
        assert_eq!(stats.snapshot().module_starts, 0);
    }

    #[tokio::test]
    async fn file_output_is_flushed_on_stop() {
        let stats = Arc::new(Stats::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let runner = runner(Output::file(&path), &stats, "5ms");

        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        runner.stop().await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(lines.len() >= 2);
        assert!(lines.iter().all(|l| l["metricset"]["module"] == "fake"));

        let published = stats.snapshot().get("fake", "status").unwrap().events;
        assert!(published >= lines.len() as u64);
    }
}
