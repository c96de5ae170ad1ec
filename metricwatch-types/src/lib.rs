//! # metricwatch-types
//!
//! Core types shared by the metricwatch scheduler, its publishers and
//! anything consuming its output. This crate defines what a fetched metric
//! looks like once it leaves a metricset.
//!
//! ## Design Goals
//!
//! - **One shape for every metricset**: payloads are nested under
//!   `<module>.<metricset>` next to a common `metricset` block
//! - **Failures are data**: a failed fetch still yields an event carrying
//!   the error message and timing
//! - **Humanized configuration**: durations parse from `"10s"`-style strings
//!
//! ## Example
//!
//! ```rust
//! use metricwatch_types::{parse_duration, Event, Microseconds};
//! use std::time::Duration;
//!
//! let mut event = Event::new("redis", "info", chrono::Utc::now());
//! event.host = Some("127.0.0.1:6379".to_string());
//! event.rtt = Microseconds::from(parse_duration("1.5ms").unwrap());
//!
//! assert_eq!(event.rtt.to_duration(), Duration::from_micros(1500));
//! assert_eq!(event.to_value()["metricset"]["host"], "127.0.0.1:6379");
//! ```

mod duration;
mod event;

pub use duration::*;
pub use event::*;
