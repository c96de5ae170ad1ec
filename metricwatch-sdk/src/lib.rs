//! # metricwatch-sdk
//!
//! The module/metricset scheduler behind metricwatch.
//!
//! Module configurations are turned into [`ModuleWrapper`]s through a
//! [`Registry`] of metricset factories. Starting a wrapper spawns one fetch
//! loop per metricset and host; every fetch result becomes an [`Event`]
//! that a [`ModuleRunner`] forwards to a [`Publisher`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metricwatch_sdk::{
//!     EventFetcher, FetchError, Fetcher, ModuleRunner, ModuleWrapper, Output, Payload,
//!     Registry, Stats,
//! };
//! use std::sync::Arc;
//!
//! struct Ping;
//!
//! #[async_trait::async_trait]
//! impl EventFetcher for Ping {
//!     async fn fetch(&mut self) -> Result<Payload, FetchError> {
//!         let mut payload = Payload::new();
//!         payload.insert("ok".into(), true.into());
//!         Ok(payload)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = Registry::new();
//!     registry.add_metricset("net", "ping", |_| Ok(Fetcher::single(Ping))).unwrap();
//!
//!     let stats = Arc::new(Stats::new());
//!     let raw = serde_json::json!({ "module": "net", "metricsets": ["ping"], "period": "1s" });
//!     let wrapper = ModuleWrapper::from_config(&raw, &registry, &stats).unwrap();
//!
//!     let runner = ModuleRunner::new(wrapper, Arc::new(Output::Stdout), stats);
//!     runner.start().await.unwrap();
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     runner.stop().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Isolated workers**: a slow, failing or panicking metricset never
//!   affects its siblings
//! - **Prompt cancellation**: stopping a module interrupts timers, fetches
//!   and blocked sends
//! - **Stable identity**: modules are keyed by a hash of their config, so
//!   unchanged modules survive reloads untouched

mod config;
mod error;
mod event_builder;
mod filter;
mod metricset;
mod publisher;
mod registry;
mod runner;
mod shutdown;
mod stats;
mod wrapper;

pub use config::{is_enabled, ModuleConfig, ModuleHash, DEFAULT_PERIOD};
pub use error::{BoxError, Error, FetchError};
pub use event_builder::EventBuilder;
pub use filter::{
    get_path, insert_path, remove_path, Condition, DropEvent, DropFields, Filter, FilterChain,
    FilterConfig, IncludeFields,
};
pub use metricset::{EventFetcher, EventsFetcher, Fetcher, MetricSet, MetricSetContext, Module};
pub use publisher::{Client, Output, Publisher};
pub use registry::{MetricSetFactory, Registry};
pub use runner::ModuleRunner;
pub use shutdown::{Done, Shutdown};
pub use stats::{CounterSnapshot, GaugeGuard, MetricSetCounters, MetricSetSnapshot, Stats, StatsSnapshot};
pub use wrapper::{new_module_wrappers, MetricSetWrapper, ModuleInfo, ModuleWrapper, Wrapped};

// Re-export types for convenience
pub use metricwatch_types::{Event, EventMetadata, Microseconds, Payload};
