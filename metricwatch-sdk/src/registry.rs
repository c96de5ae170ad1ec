//! Registry of metricset factories.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ModuleConfig;
use crate::error::{BoxError, Error};
use crate::metricset::{Fetcher, MetricSet, MetricSetContext, Module};

/// Builds one metricset instance for one host.
pub type MetricSetFactory =
    Arc<dyn Fn(&MetricSetContext<'_>) -> Result<Fetcher, BoxError> + Send + Sync>;

/// Maps `module/metricset` names to factories.
///
/// Populated once at startup, then shared read-only.
///
/// ```rust
/// use metricwatch_sdk::{EventFetcher, FetchError, Fetcher, ModuleConfig, Payload, Registry};
///
/// struct Ping;
///
/// #[async_trait::async_trait]
/// impl EventFetcher for Ping {
///     async fn fetch(&mut self) -> Result<Payload, FetchError> {
///         Ok(Payload::new())
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.add_metricset("net", "ping", |_ctx| Ok(Fetcher::single(Ping))).unwrap();
///
/// let mut config = ModuleConfig::new("net", &["ping"]);
/// config.hosts = vec!["a".into(), "b".into()];
/// let (_module, metricsets) = registry.create(&config).unwrap();
/// assert_eq!(metricsets.len(), 2);
/// ```
#[derive(Default, Clone)]
pub struct Registry {
    modules: BTreeMap<String, BTreeMap<String, MetricSetFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; fails if `module/name` is already taken.
    pub fn add_metricset<F>(&mut self, module: &str, name: &str, factory: F) -> Result<(), Error>
    where
        F: Fn(&MetricSetContext<'_>) -> Result<Fetcher, BoxError> + Send + Sync + 'static,
    {
        let metricsets = self.modules.entry(module.to_string()).or_default();
        if metricsets.contains_key(name) {
            return Err(Error::DuplicateMetricSet {
                module: module.to_string(),
                metricset: name.to_string(),
            });
        }
        metricsets.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, module: &str, metricset: &str) -> bool {
        self.modules
            .get(module)
            .is_some_and(|sets| sets.contains_key(metricset))
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    pub fn metricset_names(&self, module: &str) -> Vec<&str> {
        self.modules
            .get(module)
            .map(|sets| sets.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Build a module and one metricset per (metricset, host) pair.
    ///
    /// Metricsets come out in config order, and within a metricset, hosts in
    /// config order. A module with no hosts gets a single instance with an
    /// empty host. Any failure fails the whole module.
    pub fn create(&self, config: &ModuleConfig) -> Result<(Module, Vec<MetricSet>), Error> {
        config.validate()?;

        let factories = self
            .modules
            .get(&config.module)
            .ok_or_else(|| Error::UnknownModule(config.module.clone()))?;

        let no_host = [String::new()];
        let hosts: &[String] = if config.hosts.is_empty() {
            &no_host
        } else {
            &config.hosts
        };

        let mut metricsets = Vec::with_capacity(config.metricsets.len() * hosts.len());
        let mut errors = Vec::new();

        for name in &config.metricsets {
            let Some(factory) = factories.get(name) else {
                errors.push(Error::UnknownMetricSet {
                    module: config.module.clone(),
                    metricset: name.clone(),
                });
                continue;
            };

            for host in hosts {
                let ctx = MetricSetContext {
                    module: config,
                    metricset: name,
                    host,
                };
                match factory(&ctx) {
                    Ok(fetcher) => metricsets.push(MetricSet {
                        module: config.module.clone(),
                        name: name.clone(),
                        host: host.clone(),
                        fetcher,
                    }),
                    Err(source) => errors.push(Error::MetricSetInit {
                        module: config.module.clone(),
                        metricset: name.clone(),
                        host: host.clone(),
                        source,
                    }),
                }
            }
        }

        if let Some(err) = Error::from_many(errors) {
            return Err(err);
        }

        let module = Module {
            name: config.module.clone(),
            config: config.clone(),
        };
        Ok((module, metricsets))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (module, sets) in &self.modules {
            map.entry(module, &sets.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::metricset::EventFetcher;
    use async_trait::async_trait;
    use metricwatch_types::Payload;

    struct Noop;

    #[async_trait]
    impl EventFetcher for Noop {
        async fn fetch(&mut self) -> Result<Payload, FetchError> {
            Ok(Payload::new())
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .add_metricset("fake", "status", |_| Ok(Fetcher::single(Noop)))
            .unwrap();
        registry
            .add_metricset("fake", "info", |_| Ok(Fetcher::single(Noop)))
            .unwrap();
        registry
            .add_metricset("fake", "broken", |ctx| {
                Err(format!("cannot reach '{}'", ctx.host).into())
            })
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry
            .add_metricset("fake", "status", |_| Ok(Fetcher::single(Noop)))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateMetricSet { .. }));
    }

    #[test]
    fn lookup_helpers() {
        let registry = registry();
        assert!(registry.contains("fake", "status"));
        assert!(!registry.contains("fake", "nope"));
        assert!(!registry.contains("other", "status"));
        assert_eq!(registry.module_names(), vec!["fake"]);
        assert_eq!(registry.metricset_names("fake"), vec!["broken", "info", "status"]);
    }

    #[test]
    fn creates_metricsets_then_hosts_in_config_order() {
        let mut config = ModuleConfig::new("fake", &["status", "info"]);
        config.hosts = vec!["alpha".into(), "beta".into()];

        let (module, sets) = registry().create(&config).unwrap();
        assert_eq!(module.name, "fake");

        let ids: Vec<String> = sets.iter().map(MetricSet::id).collect();
        assert_eq!(
            ids,
            vec![
                "fake/status@alpha",
                "fake/status@beta",
                "fake/info@alpha",
                "fake/info@beta",
            ]
        );
    }

    #[test]
    fn no_hosts_means_one_instance_with_empty_host() {
        let (_, sets) = registry()
            .create(&ModuleConfig::new("fake", &["status"]))
            .unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].host, "");
    }

    #[test]
    fn unknown_names_and_factory_errors_fail_the_module() {
        let registry = registry();

        let err = registry.create(&ModuleConfig::new("ghost", &["x"])).unwrap_err();
        assert!(matches!(err, Error::UnknownModule(name) if name == "ghost"));

        let err = registry.create(&ModuleConfig::new("fake", &["nope"])).unwrap_err();
        assert!(matches!(err, Error::UnknownMetricSet { .. }));

        let mut config = ModuleConfig::new("fake", &["status", "broken"]);
        config.hosts = vec!["h1".into()];
        let err = registry.create(&config).unwrap_err();
        assert!(err.to_string().contains("cannot reach 'h1'"));
    }
}
