//! Metricsets shipped with the agent itself.
//!
//! - `agent/uptime`: process id and time since the registry was built
//! - `agent/counters`: one event per metricset with its fetch counters

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metricwatch_sdk::{
    Error, EventFetcher, EventsFetcher, FetchError, Fetcher, Payload, Registry, Stats,
};
use serde_json::json;

pub const MODULE: &str = "agent";

/// Register the `agent` module's metricsets.
pub fn register(registry: &mut Registry, stats: Arc<Stats>) -> Result<(), Error> {
    let started = Instant::now();
    registry.add_metricset(MODULE, "uptime", move |_| {
        Ok(Fetcher::single(Uptime { started }))
    })?;
    registry.add_metricset(MODULE, "counters", move |_| {
        Ok(Fetcher::multi(Counters {
            stats: stats.clone(),
        }))
    })?;
    Ok(())
}

/// Registry holding only the built-in metricsets.
pub fn registry(stats: Arc<Stats>) -> Result<Registry, Error> {
    let mut registry = Registry::new();
    register(&mut registry, stats)?;
    Ok(registry)
}

struct Uptime {
    started: Instant,
}

#[async_trait]
impl EventFetcher for Uptime {
    async fn fetch(&mut self) -> Result<Payload, FetchError> {
        let mut payload = Payload::new();
        payload.insert(
            "uptime".into(),
            json!({ "ms": self.started.elapsed().as_millis() as u64 }),
        );
        payload.insert("pid".into(), json!(std::process::id()));
        Ok(payload)
    }
}

struct Counters {
    stats: Arc<Stats>,
}

#[async_trait]
impl EventsFetcher for Counters {
    async fn fetch(&mut self) -> Result<Vec<Payload>, FetchError> {
        let snapshot = self.stats.snapshot();
        let payloads = snapshot
            .metricsets
            .into_iter()
            .map(|ms| {
                let mut payload = Payload::new();
                payload.insert("module".into(), json!(ms.module));
                payload.insert("metricset".into(), json!(ms.metricset));
                payload.insert("success".into(), json!(ms.counters.success));
                payload.insert("failures".into(), json!(ms.counters.failures));
                payload.insert("events".into(), json!(ms.counters.events));
                payload
            })
            .collect();
        Ok(payloads)
    }
}
