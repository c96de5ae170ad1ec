//! # metricwatch
//!
//! A metrics collection agent built on [`metricwatch_sdk`].
//!
//! The agent runs two kinds of modules:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Agent                              │
//! │                                                              │
//! │  settings.modules ──▶ ModuleRunner ──┐                       │
//! │                                      ├──▶ Publisher (output) │
//! │  modules.d/*.toml ──▶ ConfigReloader ┘                       │
//! │       (glob)          (hash diff)                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Static modules** come from the main config file and run until the
//!   agent stops
//! - **Dynamic modules** come from fragment files; the [`ConfigReloader`]
//!   rescans them periodically and restarts only modules whose config
//!   changed
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Run with a config file
//! metricwatch --config /etc/metricwatch/metricwatch.toml
//!
//! # Run one fetch round and exit
//! metricwatch --config metricwatch.toml --once
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use metricwatch::{Agent, Settings};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings {
//!     modules: vec![serde_json::json!({
//!         "module": "agent",
//!         "metricsets": ["uptime"],
//!         "period": "1s",
//!     })],
//!     ..Default::default()
//! };
//!
//! let mut agent = Agent::new(settings).unwrap();
//! agent.start().await.unwrap();
//! tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//! agent.stop().await;
//! # });
//! ```

pub mod agent;
pub mod builtin;
pub mod logging;
pub mod reload;
pub mod settings;

// Re-export main types for convenience
pub use agent::Agent;
pub use reload::{ConfigReloader, ReloadError, ReloadSummary, RunningRegistry};
pub use settings::{LoggingSettings, OutputSettings, ReloadSettings, Settings};
