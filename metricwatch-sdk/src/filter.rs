//! Payload filters applied before an event is emitted.
//!
//! A module compiles its `filters` list into a [`FilterChain`] once, at
//! construction. Each filter either rewrites the payload or drops it; a
//! dropped payload produces no event and no error.

use std::collections::BTreeMap;
use std::fmt;

use metricwatch_types::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// A single payload transformation.
pub trait Filter: Send + Sync + fmt::Debug {
    /// Returns the (possibly rewritten) payload, or `None` to drop it.
    fn run(&self, payload: Payload) -> Option<Payload>;
}

/// Configuration of one filter rule, as written in a module config.
///
/// ```toml
/// filters = [
///     { drop_fields = { fields = ["raw"] } },
///     { drop_event = { when = { equals = { status = "idle" } } } },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterConfig {
    DropFields { fields: Vec<String> },
    IncludeFields { fields: Vec<String> },
    DropEvent { when: Condition },
}

/// Predicate over a payload. Every non-empty clause must match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub equals: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contains: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_fields: Vec<String>,
}

impl Condition {
    fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.contains.is_empty() && self.has_fields.is_empty()
    }

    /// Whether the payload satisfies every clause.
    pub fn matches(&self, payload: &Payload) -> bool {
        let equals = self.equals.iter().all(|(path, expected)| {
            get_path(payload, path).is_some_and(|actual| values_equal(actual, expected))
        });
        let contains = self.contains.iter().all(|(path, needle)| {
            get_path(payload, path).is_some_and(|actual| value_contains(actual, needle))
        });
        let has_fields = self
            .has_fields
            .iter()
            .all(|path| get_path(payload, path).is_some());

        equals && contains && has_fields
    }
}

/// Ordered list of compiled filters.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    /// An empty chain; passes every payload through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile filter configs in order.
    pub fn compile(configs: &[FilterConfig]) -> Result<Self, Error> {
        let mut chain = Self::new();
        for config in configs {
            let filter: Box<dyn Filter> = match config {
                FilterConfig::DropFields { fields } => {
                    Box::new(DropFields::new(fields.clone())?)
                }
                FilterConfig::IncludeFields { fields } => {
                    Box::new(IncludeFields::new(fields.clone())?)
                }
                FilterConfig::DropEvent { when } => Box::new(DropEvent::new(when.clone())?),
            };
            chain.push(filter);
        }
        Ok(chain)
    }

    /// Append a filter to the end of the chain.
    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter in order; stops at the first drop.
    pub fn run(&self, payload: Payload) -> Option<Payload> {
        self.filters
            .iter()
            .try_fold(payload, |payload, filter| filter.run(payload))
    }
}

/// Removes the listed fields.
#[derive(Debug)]
pub struct DropFields {
    fields: Vec<String>,
}

impl DropFields {
    pub fn new(fields: Vec<String>) -> Result<Self, Error> {
        check_paths("drop_fields", &fields)?;
        Ok(Self { fields })
    }
}

impl Filter for DropFields {
    fn run(&self, mut payload: Payload) -> Option<Payload> {
        for path in &self.fields {
            remove_path(&mut payload, path);
        }
        Some(payload)
    }
}

/// Keeps only the listed fields.
#[derive(Debug)]
pub struct IncludeFields {
    fields: Vec<String>,
}

impl IncludeFields {
    pub fn new(fields: Vec<String>) -> Result<Self, Error> {
        check_paths("include_fields", &fields)?;
        Ok(Self { fields })
    }
}

impl Filter for IncludeFields {
    fn run(&self, mut payload: Payload) -> Option<Payload> {
        let mut kept = Payload::new();
        for path in &self.fields {
            if let Some(value) = remove_path(&mut payload, path) {
                insert_path(&mut kept, path, value);
            }
        }
        Some(kept)
    }
}

/// Drops the payload when the condition matches.
#[derive(Debug)]
pub struct DropEvent {
    when: Condition,
}

impl DropEvent {
    pub fn new(when: Condition) -> Result<Self, Error> {
        if when.is_empty() {
            return Err(Error::Filter("drop_event requires a non-empty 'when'".into()));
        }
        Ok(Self { when })
    }
}

impl Filter for DropEvent {
    fn run(&self, payload: Payload) -> Option<Payload> {
        if self.when.matches(&payload) {
            None
        } else {
            Some(payload)
        }
    }
}

fn check_paths(rule: &str, fields: &[String]) -> Result<(), Error> {
    if fields.is_empty() {
        return Err(Error::Filter(format!("{} requires at least one field", rule)));
    }
    if let Some(bad) = fields
        .iter()
        .find(|f| f.is_empty() || f.split('.').any(str::is_empty))
    {
        return Err(Error::Filter(format!("{}: invalid field path '{}'", rule, bad)));
    }
    Ok(())
}

/// Look up a dotted path (`a.b.c`) in a payload.
pub fn get_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Remove a dotted path from a payload, returning the removed value.
pub fn remove_path(payload: &mut Payload, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => payload.remove(path),
        Some((parent, leaf)) => {
            let mut current = payload;
            for part in parent.split('.') {
                current = current.get_mut(part)?.as_object_mut()?;
            }
            current.remove(leaf)
        }
    }
}

/// Insert a value at a dotted path, creating intermediate objects.
pub fn insert_path(payload: &mut Payload, path: &str, value: Value) {
    match path.rsplit_once('.') {
        None => {
            payload.insert(path.to_string(), value);
        }
        Some((parent, leaf)) => {
            let mut current = payload;
            for part in parent.split('.') {
                let entry = current
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Payload::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Payload::new());
                }
                current = match entry.as_object_mut() {
                    Some(map) => map,
                    None => return,
                };
            }
            current.insert(leaf.to_string(), value);
        }
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) if actual.is_number() && expected.is_number() => a == b,
        _ => actual == expected,
    }
}

fn value_contains(actual: &Value, needle: &str) -> bool {
    match actual {
        Value::String(s) => s.contains(needle),
        Value::Array(items) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| s.contains(needle))),
        _ => false,
    }
}
