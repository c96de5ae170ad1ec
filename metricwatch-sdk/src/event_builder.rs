//! Turns one fetch result into a normalized [`Event`].

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use metricwatch_types::{Event, EventMetadata, Microseconds, Payload, DEFAULT_EVENT_TYPE};
use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::filter::FilterChain;

/// Inputs collected by a metricset worker for one fetch.
///
/// ```rust
/// use metricwatch_sdk::{EventBuilder, FilterChain, Payload};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let filters = FilterChain::new();
/// let mut payload = Payload::new();
/// payload.insert("type".into(), json!("custom"));
/// payload.insert("value".into(), json!(42));
///
/// let event = EventBuilder {
///     module: "fake",
///     metricset: "status",
///     host: "alpha",
///     start_time: chrono::Utc::now(),
///     fetch_duration: Duration::from_millis(3),
///     payload: Some(payload),
///     fetch_error: None,
///     filters: &filters,
///     metadata: None,
/// }
/// .build()
/// .unwrap()
/// .unwrap();
///
/// assert_eq!(event.event_type, "custom");
/// assert!(!event.payload.contains_key("type"));
/// ```
#[derive(Debug)]
pub struct EventBuilder<'a> {
    pub module: &'a str,
    pub metricset: &'a str,
    /// Empty when the metricset has no host.
    pub host: &'a str,
    pub start_time: DateTime<Utc>,
    pub fetch_duration: Duration,
    pub payload: Option<Payload>,
    pub fetch_error: Option<String>,
    pub filters: &'a FilterChain,
    pub metadata: Option<&'a EventMetadata>,
}

impl EventBuilder<'_> {
    /// Build the event. `Ok(None)` means a filter dropped it.
    pub fn build(self) -> Result<Option<Event>, Error> {
        if self.module.is_empty() || self.metricset.is_empty() {
            return Err(Error::InvalidEvent(format!(
                "module and metricset names are required (got '{}/{}')",
                self.module, self.metricset
            )));
        }

        let mut payload = self.payload.unwrap_or_default();

        let index = take_string(&mut payload, "index", self.module, self.metricset);
        let event_type = take_string(&mut payload, "type", self.module, self.metricset)
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());
        let timestamp = take_timestamp(&mut payload, self.module, self.metricset)
            .unwrap_or(self.start_time);

        let Some(payload) = self.filters.run(payload) else {
            return Ok(None);
        };

        let mut event = Event::new(self.module, self.metricset, timestamp);
        event.event_type = event_type;
        event.index = index;
        event.host = (!self.host.is_empty()).then(|| self.host.to_string());
        event.rtt = Microseconds::from(self.fetch_duration);
        event.payload = payload;
        event.error = self.fetch_error;
        if let Some(metadata) = self.metadata {
            event.metadata = metadata.clone();
        }

        Ok(Some(event))
    }
}

fn take_string(payload: &mut Payload, key: &str, module: &str, metricset: &str) -> Option<String> {
    match payload.remove(key)? {
        Value::String(s) => Some(s),
        other => {
            warn!(
                module,
                metricset,
                key,
                value = %other,
                "ignoring non-string override in payload"
            );
            None
        }
    }
}

fn take_timestamp(payload: &mut Payload, module: &str, metricset: &str) -> Option<DateTime<Utc>> {
    let raw = payload.remove("@timestamp")?;
    let parsed = match &raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    };

    if parsed.is_none() {
        warn!(
            module,
            metricset,
            value = %raw,
            "ignoring unparseable @timestamp override in payload"
        );
    }
    parsed
}
