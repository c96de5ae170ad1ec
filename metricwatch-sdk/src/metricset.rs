//! Module and metricset definitions.
//!
//! A metricset is the unit that fetches one kind of data from one host. Its
//! fetch capability is resolved once, at construction, into a [`Fetcher`].

use std::fmt;

use async_trait::async_trait;
use metricwatch_types::Payload;

use crate::config::ModuleConfig;
use crate::error::FetchError;

/// A metricset that returns one payload per fetch.
#[async_trait]
pub trait EventFetcher: Send {
    async fn fetch(&mut self) -> Result<Payload, FetchError>;
}

/// A metricset that returns any number of payloads per fetch.
#[async_trait]
pub trait EventsFetcher: Send {
    async fn fetch(&mut self) -> Result<Vec<Payload>, FetchError>;
}

/// The fetch capability of a metricset.
pub enum Fetcher {
    Single(Box<dyn EventFetcher>),
    Multi(Box<dyn EventsFetcher>),
}

impl Fetcher {
    pub fn single(fetcher: impl EventFetcher + 'static) -> Self {
        Fetcher::Single(Box::new(fetcher))
    }

    pub fn multi(fetcher: impl EventsFetcher + 'static) -> Self {
        Fetcher::Multi(Box::new(fetcher))
    }

    /// Fetch once, normalizing both shapes to a list of payloads.
    pub async fn fetch(&mut self) -> Result<Vec<Payload>, FetchError> {
        match self {
            Fetcher::Single(f) => f.fetch().await.map(|payload| vec![payload]),
            Fetcher::Multi(f) => f.fetch().await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Fetcher::Single(_) => "single",
            Fetcher::Multi(_) => "multi",
        }
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fetcher::{}", self.kind())
    }
}

/// A configured module: its name and the config it was built from.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub config: ModuleConfig,
}

/// What a metricset factory gets to build one instance.
#[derive(Debug, Clone, Copy)]
pub struct MetricSetContext<'a> {
    pub module: &'a ModuleConfig,
    pub metricset: &'a str,
    /// Empty when the module configures no hosts.
    pub host: &'a str,
}

/// One metricset instance, bound to a single host.
#[derive(Debug)]
pub struct MetricSet {
    pub module: String,
    pub name: String,
    pub host: String,
    pub fetcher: Fetcher,
}

impl MetricSet {
    /// `module/name` or `module/name@host`, used in log lines.
    pub fn id(&self) -> String {
        if self.host.is_empty() {
            format!("{}/{}", self.module, self.name)
        } else {
            format!("{}/{}@{}", self.module, self.name, self.host)
        }
    }
}
