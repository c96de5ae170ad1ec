//! The agent: static modules plus an optional config reloader.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::future::join_all;
use metricwatch_sdk::{
    new_module_wrappers, Error, ModuleRunner, Publisher, Registry, Stats, Wrapped,
};
use tracing::{info, warn};

use crate::builtin;
use crate::reload::ConfigReloader;
use crate::settings::Settings;

/// Owns every running module of the process.
///
/// Static modules from [`Settings::modules`] are started once and never
/// diffed; dynamic modules belong to the [`ConfigReloader`].
pub struct Agent {
    settings: Settings,
    registry: Arc<Registry>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<Stats>,
    runners: Vec<Arc<ModuleRunner>>,
    reloader: Option<ConfigReloader>,
}

impl Agent {
    /// Agent with the built-in metricsets and the configured output.
    pub fn new(settings: Settings) -> Result<Self> {
        let stats = Arc::new(Stats::new());
        let registry =
            builtin::registry(stats.clone()).context("failed to register built-in metricsets")?;
        let publisher = Arc::new(settings.output.build());
        Ok(Self::with_parts(settings, registry, publisher, stats))
    }

    pub fn with_parts(
        settings: Settings,
        registry: Registry,
        publisher: Arc<dyn Publisher>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            settings,
            registry: Arc::new(registry),
            publisher,
            stats,
            runners: Vec::new(),
            reloader: None,
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn static_runners(&self) -> &[Arc<ModuleRunner>] {
        &self.runners
    }

    pub fn reloader(&self) -> Option<&ConfigReloader> {
        self.reloader.as_ref()
    }

    /// Longest period among static modules, or the reload period when
    /// there are none.
    pub fn longest_period(&self) -> Duration {
        self.runners
            .iter()
            .map(|runner| runner.info().period())
            .max()
            .unwrap_or(self.settings.reload.period)
    }

    /// Start static modules, then the reloader if enabled.
    ///
    /// Fails when no static module is usable and reloading is off, or when
    /// every static module failed to build. Partial failures are logged.
    pub async fn start(&mut self) -> Result<()> {
        if !self.runners.is_empty() || self.reloader.is_some() {
            bail!("agent already started");
        }
        if self.settings.reload.enabled {
            self.settings
                .reload
                .validate()
                .context("invalid reload settings")?;
        }

        let Wrapped { wrappers, errors } =
            new_module_wrappers(&self.settings.modules, &self.registry, &self.stats);

        if wrappers.is_empty() {
            if let Some(err) = Error::from_many(errors) {
                return Err(err).context("no static module could be built");
            }
            if !self.settings.reload.enabled {
                bail!("no modules configured");
            }
        } else {
            for err in &errors {
                warn!(error = %err, "skipping static module");
            }
        }

        for wrapper in wrappers {
            let runner = Arc::new(ModuleRunner::new(
                wrapper,
                self.publisher.clone(),
                self.stats.clone(),
            ));
            if let Err(err) = runner.start().await {
                let name = runner.info().name.clone();
                self.stop().await;
                return Err(err).with_context(|| format!("failed to start module '{}'", name));
            }
            self.runners.push(runner);
        }

        if self.settings.reload.enabled {
            let reloader = ConfigReloader::new(
                self.settings.reload.clone(),
                self.registry.clone(),
                self.publisher.clone(),
                self.stats.clone(),
            );
            reloader.run();
            self.reloader = Some(reloader);
        }

        info!(
            static_modules = self.runners.len(),
            reload = self.settings.reload.enabled,
            "agent started"
        );
        Ok(())
    }

    /// Stop the reloader and its modules, then every static module.
    pub async fn stop(&mut self) {
        if let Some(reloader) = self.reloader.take() {
            reloader.stop().await;
        }

        let runners = std::mem::take(&mut self.runners);
        join_all(runners.iter().map(|runner| runner.stop())).await;

        info!("agent stopped");
    }
}
