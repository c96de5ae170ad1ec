//! Module configuration and its content-derived identity.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use metricwatch_types::{humanized, EventMetadata, RESERVED_KEYS};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::filter::FilterConfig;

/// Fetch period used when a module does not set one.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

fn default_period() -> Duration {
    DEFAULT_PERIOD
}

fn default_enabled() -> bool {
    true
}

/// `true`/`false`, case-insensitive, as environment overrides spell them.
fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn deserialize_enabled<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(enabled) => Ok(enabled),
        Raw::Text(text) => parse_flag(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid enabled flag '{}'", text))
        }),
    }
}

/// Typed view of one module configuration object.
///
/// Keys that are not part of the common schema are kept in `settings` so
/// metricset factories can read module-specific options.
///
/// ```rust
/// use metricwatch_sdk::ModuleConfig;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let config = ModuleConfig::from_value(&json!({
///     "module": "redis",
///     "metricsets": ["info"],
///     "hosts": ["127.0.0.1:6379"],
///     "period": "5s",
///     "password": "secret",
/// }))
/// .unwrap();
///
/// assert_eq!(config.period, Duration::from_secs(5));
/// assert_eq!(config.settings["password"], "secret");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module type name, used for registry lookup.
    pub module: String,

    /// Metricset type names to run for this module.
    #[serde(default)]
    pub metricsets: Vec<String>,

    /// Targets; one metricset instance is created per host.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Interval between two fetches of the same metricset.
    #[serde(default = "default_period", with = "humanized")]
    pub period: Duration,

    /// Per-fetch deadline, defaults to `period`.
    #[serde(
        default,
        with = "humanized::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Disabled modules are never constructed.
    #[serde(default = "default_enabled", deserialize_with = "deserialize_enabled")]
    pub enabled: bool,

    /// Filter rules applied to every payload of the module.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterConfig>,

    /// Custom fields and tags added to every event.
    #[serde(flatten)]
    pub metadata: EventMetadata,

    /// Module-specific options.
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

impl ModuleConfig {
    /// Minimal config for a module with the given metricsets.
    pub fn new(module: impl Into<String>, metricsets: &[&str]) -> Self {
        Self {
            module: module.into(),
            metricsets: metricsets.iter().map(|s| s.to_string()).collect(),
            hosts: Vec::new(),
            period: DEFAULT_PERIOD,
            timeout: None,
            enabled: true,
            filters: Vec::new(),
            metadata: EventMetadata::default(),
            settings: BTreeMap::new(),
        }
    }

    /// Parse and validate a raw configuration object.
    pub fn from_value(raw: &Value) -> Result<Self, Error> {
        let config: ModuleConfig = serde_json::from_value(raw.clone())
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the scheduler relies on.
    pub fn validate(&self) -> Result<(), Error> {
        if self.module.trim().is_empty() {
            return Err(Error::InvalidConfig("module name is required".to_string()));
        }
        if RESERVED_KEYS.contains(&self.module.as_str()) {
            return Err(Error::InvalidConfig(format!(
                "module name '{}' is reserved",
                self.module
            )));
        }
        if self.metricsets.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "module '{}' has no metricsets configured",
                self.module
            )));
        }
        if self.period.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "module '{}' period must be positive",
                self.module
            )));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig(format!(
                "module '{}' timeout must be positive",
                self.module
            )));
        }
        Ok(())
    }

    /// The per-fetch deadline actually applied.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(self.period)
    }

    /// Content hash identifying this module across reloads.
    pub fn hash(&self) -> ModuleHash {
        ModuleHash::of(self)
    }
}

/// Whether a raw module config is enabled, without fully parsing it.
///
/// A missing key means enabled. `"true"`/`"false"` strings are read the same
/// way [`ModuleConfig`] reads them; any other value counts as enabled and is
/// rejected by full parsing.
pub fn is_enabled(raw: &Value) -> bool {
    match raw.get("enabled") {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::String(s)) => parse_flag(s).unwrap_or(true),
        _ => true,
    }
}

/// Stable identity of a module configuration.
///
/// The BLAKE3 digest of the canonical JSON rendering (object keys sorted at
/// every level) of the normalized config. Two configs that differ only in
/// key order or in spelling out a default produce the same hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHash(String);

impl ModuleHash {
    /// Hash a module configuration.
    pub fn of(config: &ModuleConfig) -> Self {
        // Debug rendering if the config cannot become a Value.
        let canonical = match serde_json::to_value(config) {
            Ok(value) => canonical_json(&value),
            Err(_) => format!("{:?}", config),
        };
        ModuleHash(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    /// Full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated digest for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ModuleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render JSON with object keys sorted recursively.
pub(crate) fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_applied() {
        let config = ModuleConfig::from_value(&json!({
            "module": "fake",
            "metricsets": ["status"],
        }))
        .unwrap();

        assert_eq!(config.period, DEFAULT_PERIOD);
        assert_eq!(config.effective_timeout(), DEFAULT_PERIOD);
        assert!(config.enabled);
        assert!(config.hosts.is_empty());
        assert!(config.filters.is_empty());
        assert!(config.settings.is_empty());
    }

    #[test]
    fn unknown_keys_become_settings_and_metadata_is_extracted() {
        let config = ModuleConfig::from_value(&json!({
            "module": "fake",
            "metricsets": ["status"],
            "timeout": "2s",
            "fields": { "env": "prod" },
            "tags": ["edge"],
            "ssl": { "verify": false },
        }))
        .unwrap();

        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.metadata.fields["env"], json!("prod"));
        assert_eq!(config.metadata.tags, vec!["edge".to_string()]);
        assert_eq!(config.settings.len(), 1);
        assert_eq!(config.settings["ssl"], json!({ "verify": false }));
    }

    #[test]
    fn validation_rejects_incomplete_configs() {
        let missing_metricsets = ModuleConfig::from_value(&json!({ "module": "fake" }));
        assert!(matches!(missing_metricsets, Err(Error::InvalidConfig(_))));

        let empty_name = ModuleConfig::from_value(&json!({ "module": " ", "metricsets": ["a"] }));
        assert!(matches!(empty_name, Err(Error::InvalidConfig(_))));

        let zero_period = ModuleConfig::from_value(&json!({
            "module": "fake", "metricsets": ["a"], "period": "0s"
        }));
        assert!(matches!(zero_period, Err(Error::InvalidConfig(_))));

        let bad_type = ModuleConfig::from_value(&json!({ "module": 7, "metricsets": ["a"] }));
        assert!(matches!(bad_type, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn enabled_flag_read_from_raw() {
        assert!(is_enabled(&json!({ "module": "a" })));
        assert!(is_enabled(&json!({ "enabled": true })));
        assert!(!is_enabled(&json!({ "enabled": false })));
        assert!(!is_enabled(&json!({ "enabled": "false" })));
    }

    #[test]
    fn string_enabled_flags_parse_like_the_raw_check() {
        for (raw, expected) in [("true", true), ("FALSE", false), (" false ", false)] {
            let value = json!({ "module": "a", "metricsets": ["x"], "enabled": raw });
            let config = ModuleConfig::from_value(&value).unwrap();
            assert_eq!(config.enabled, expected, "{raw}");
            assert_eq!(is_enabled(&value), expected, "{raw}");
        }

        let garbage = json!({ "module": "a", "metricsets": ["x"], "enabled": "maybe" });
        assert!(is_enabled(&garbage));
        assert!(matches!(
            ModuleConfig::from_value(&garbage),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn reserved_module_names_are_rejected() {
        for name in ["metricset", "@timestamp", "beat", "type", "error"] {
            let err = ModuleConfig::from_value(&json!({ "module": name, "metricsets": ["x"] }))
                .unwrap_err();
            assert!(err.to_string().contains("reserved"), "{name}: {err}");
        }
    }

    #[test]
    fn hash_ignores_key_order_and_spelled_out_defaults() {
        let a = ModuleConfig::from_value(&json!({
            "module": "fake",
            "metricsets": ["status"],
            "hosts": ["alpha"],
            "extra": { "b": 1, "a": 2 },
        }))
        .unwrap();
        let b = ModuleConfig::from_value(&json!({
            "extra": { "a": 2, "b": 1 },
            "period": "10s",
            "enabled": true,
            "hosts": ["alpha"],
            "metricsets": ["status"],
            "module": "fake",
        }))
        .unwrap();

        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().as_str().len(), 64);
        assert_eq!(a.hash().short().len(), 12);
    }

    #[test]
    fn hash_changes_with_content() {
        let base = ModuleConfig::new("fake", &["status"]);
        let mut other = base.clone();
        other.hosts.push("beta".to_string());
        assert_ne!(base.hash(), other.hash());

        let mut slower = base.clone();
        slower.period = Duration::from_secs(30);
        assert_ne!(base.hash(), slower.hash());
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let rendered = canonical_json(&json!({ "z": [ { "y": 1, "x": 2 } ], "a": "s" }));
        assert_eq!(rendered, r#"{"a":"s","z":[{"x":2,"y":1}]}"#);
    }
}
