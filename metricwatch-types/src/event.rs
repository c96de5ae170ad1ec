//! Event - the normalized result of one fetch.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::Microseconds;

/// The raw key/value document a metricset returns from a fetch.
pub type Payload = Map<String, Value>;

/// Event type used when the payload does not override it.
pub const DEFAULT_EVENT_TYPE: &str = "metricsets";

/// Root keys of a rendered event. A module with one of these names would
/// overwrite core fields, so module configs reject them.
pub const RESERVED_KEYS: &[&str] = &[
    "@timestamp",
    "type",
    "beat",
    "metricset",
    "error",
    "fields",
    "tags",
];

/// Per-module metadata attached to every event the module emits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Custom fields added to each event.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,

    /// Place `fields` at the root of the event instead of under `fields`.
    #[serde(default)]
    pub fields_under_root: bool,

    /// Tags appended to each event.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl EventMetadata {
    /// True when there is nothing to attach.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.tags.is_empty()
    }
}

/// A single normalized event produced by one fetch of one metricset.
///
/// Events are created once, handed to a publisher client and then dropped.
/// Serialization nests the payload under `<module>.<metricset>`:
///
/// ```rust
/// use metricwatch_types::{Event, Microseconds};
/// use serde_json::json;
///
/// let mut event = Event::new("system", "cpu", chrono::Utc::now());
/// event.rtt = Microseconds::from_micros(150);
/// event.payload.insert("user".into(), json!(0.25));
///
/// let doc = event.to_value();
/// assert_eq!(doc["system"]["cpu"]["user"], json!(0.25));
/// assert_eq!(doc["metricset"]["rtt"], json!(150));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// When the fetch started, or the timestamp the metricset reported.
    pub timestamp: DateTime<Utc>,

    /// Document type, `metricsets` unless the payload overrode it.
    pub event_type: String,

    /// Target index override extracted from the payload.
    pub index: Option<String>,

    /// Module name.
    pub module: String,

    /// Metricset name.
    pub metricset: String,

    /// Host the metricset fetched from, if any.
    pub host: Option<String>,

    /// Fetch round-trip time.
    pub rtt: Microseconds,

    /// The (filtered) module-specific document.
    pub payload: Payload,

    /// Fetch error message, if the fetch failed.
    pub error: Option<String>,

    /// Module metadata (custom fields and tags).
    pub metadata: EventMetadata,
}

impl Event {
    /// Create an empty event for the given module and metricset.
    pub fn new(
        module: impl Into<String>,
        metricset: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            index: None,
            module: module.into(),
            metricset: metricset.into(),
            host: None,
            rtt: Microseconds::default(),
            payload: Payload::new(),
            error: None,
            metadata: EventMetadata::default(),
        }
    }

    /// True when the fetch that produced this event failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Render the event as the JSON document sent to publishers.
    pub fn to_value(&self) -> Value {
        let mut doc = Map::new();

        doc.insert(
            "@timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        doc.insert("type".to_string(), Value::String(self.event_type.clone()));

        if let Some(index) = &self.index {
            let mut beat = Map::new();
            beat.insert("index".to_string(), Value::String(index.clone()));
            doc.insert("beat".to_string(), Value::Object(beat));
        }

        let mut metricset = Map::new();
        metricset.insert("module".to_string(), Value::String(self.module.clone()));
        metricset.insert("name".to_string(), Value::String(self.metricset.clone()));
        if let Some(host) = &self.host {
            metricset.insert("host".to_string(), Value::String(host.clone()));
        }
        metricset.insert("rtt".to_string(), Value::from(self.rtt.as_micros()));
        doc.insert("metricset".to_string(), Value::Object(metricset));

        if let Some(error) = &self.error {
            doc.insert("error".to_string(), Value::String(error.clone()));
        }

        if !self.metadata.fields.is_empty() {
            if self.metadata.fields_under_root {
                for (key, value) in &self.metadata.fields {
                    doc.insert(key.clone(), value.clone());
                }
            } else {
                let fields: Map<String, Value> = self
                    .metadata
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                doc.insert("fields".to_string(), Value::Object(fields));
            }
        }

        if !self.metadata.tags.is_empty() {
            let tags = self.metadata.tags.iter().cloned().map(Value::String).collect();
            doc.insert("tags".to_string(), Value::Array(tags));
        }

        // Inserted last so module data always wins over root-level fields.
        let mut nested = Map::new();
        nested.insert(self.metricset.clone(), Value::Object(self.payload.clone()));
        doc.insert(self.module.clone(), Value::Object(nested));

        Value::Object(doc)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
