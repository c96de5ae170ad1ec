//! Agent settings loaded from a config file and the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use metricwatch_sdk::{Output, DEFAULT_PERIOD};
use metricwatch_types::humanized;
use serde::Deserialize;
use serde_json::Value;

/// Prefix of environment overrides, e.g. `METRICWATCH__RELOAD__ENABLED=true`.
pub const ENV_PREFIX: &str = "METRICWATCH";

/// Default glob for dynamic module fragments.
pub const DEFAULT_RELOAD_PATH: &str = "modules.d/*.toml";

/// Top-level agent settings.
///
/// ```toml
/// [[modules]]
/// module = "agent"
/// metricsets = ["uptime"]
///
/// [reload]
/// enabled = true
/// path = "modules.d/*.toml"
///
/// [output]
/// type = "file"
/// path = "events.ndjson"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Static modules, started once at bootstrap.
    pub modules: Vec<Value>,
    pub reload: ReloadSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from `path` and `METRICWATCH__*` environment variables.
    ///
    /// A missing file is an error only when `required` is set. A relative
    /// reload path is resolved against the directory of the config file.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.reload.validate()?;

        let reload_path = Path::new(&settings.reload.path);
        if reload_path.is_relative() {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                settings.reload.path = dir.join(reload_path).to_string_lossy().into_owned();
            }
        }

        Ok(settings)
    }
}

/// Dynamic module reloading.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReloadSettings {
    pub enabled: bool,

    /// Glob matching fragment files.
    pub path: String,

    /// How often the glob is re-scanned.
    #[serde(with = "humanized")]
    pub period: Duration,
}

impl ReloadSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::Message(
                "reload.period must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: DEFAULT_RELOAD_PATH.to_string(),
            period: DEFAULT_PERIOD,
        }
    }
}

/// Where events are published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputSettings {
    #[default]
    Stdout,
    File {
        path: PathBuf,
    },
    Tcp {
        address: String,
    },
}

impl OutputSettings {
    pub fn build(&self) -> Output {
        match self {
            OutputSettings::Stdout => Output::Stdout,
            OutputSettings::File { path } => Output::file(path),
            OutputSettings::Tcp { address } => Output::tcp(address.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when no log env var is set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
