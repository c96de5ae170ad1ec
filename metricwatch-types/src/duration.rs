//! Duration representation for events and configuration.
//!
//! Fetch round-trip times are recorded in microseconds, the canonical
//! sub-second unit of every emitted event. Configuration durations are
//! written as humanized strings (`"10s"`, `"250ms"`) or bare seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Duration in microseconds.
///
/// Used for the `metricset.rtt` field. Microseconds offer good precision
/// while fitting in a u64 for durations up to ~584,000 years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Microseconds(pub u64);

impl Microseconds {
    /// Create from microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Create from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1000)
    }

    /// Get the value in microseconds.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get the value in milliseconds (truncated).
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1000
    }

    /// Convert to a standard Duration.
    pub const fn to_duration(&self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl From<Duration> for Microseconds {
    fn from(d: Duration) -> Self {
        Self(d.as_micros() as u64)
    }
}

impl From<Microseconds> for Duration {
    fn from(m: Microseconds) -> Self {
        Duration::from_micros(m.0)
    }
}

/// Error returned when a duration string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// The string was empty.
    #[error("empty duration")]
    Empty,

    /// The numeric part did not parse or was negative.
    #[error("invalid duration value: {0}")]
    InvalidValue(String),

    /// No known unit suffix matched.
    #[error("unknown duration format: {0}")]
    UnknownUnit(String),
}

/// Suffix to nanoseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

/// Parse duration strings like "10s", "1.5s", "250ms", "500us", "2m", "1h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str
                .trim()
                .parse()
                .map_err(|_| DurationError::InvalidValue(s.to_string()))?;
            if !val.is_finite() || val < 0.0 {
                return Err(DurationError::InvalidValue(s.to_string()));
            }
            return Ok(Duration::from_nanos((val * multiplier) as u64));
        }
    }

    Err(DurationError::UnknownUnit(s.to_string()))
}

/// Format a duration the way configuration files spell it.
///
/// The output always parses back with [`parse_duration`].
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0s".to_string()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", d.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else if nanos % 1_000 == 0 {
        format!("{}us", d.as_micros())
    } else {
        format!("{}ns", nanos)
    }
}

/// Serde adapter for `Duration` fields written as humanized strings.
///
/// ```rust
/// use std::time::Duration;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Reload {
///     #[serde(with = "metricwatch_types::humanized")]
///     period: Duration,
/// }
///
/// let reload: Reload = serde_json::from_str(r#"{"period": "250ms"}"#).unwrap();
/// assert_eq!(reload.period, Duration::from_millis(250));
/// ```
pub mod humanized {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }

    /// Same as the parent module, for `Option<Duration>` fields.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            d: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => serializer.serialize_some(&format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            match Option::<Raw>::deserialize(deserializer)? {
                None => Ok(None),
                Some(Raw::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
                Some(Raw::Text(text)) => parse_duration(&text)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microseconds_from_duration() {
        let m = Microseconds::from(Duration::from_millis(1500));
        assert_eq!(m.as_micros(), 1_500_000);
        assert_eq!(m.as_millis(), 1500);

        let d: Duration = m.into();
        assert_eq!(d, Duration::from_millis(1500));
    }

    #[test]
    fn microseconds_truncates_nanos() {
        let m = Microseconds::from(Duration::from_nanos(1_999));
        assert_eq!(m.as_micros(), 1);
    }

    #[test]
    fn microseconds_serializes_as_plain_number() {
        let json = serde_json::to_string(&Microseconds::from_millis(3)).unwrap();
        assert_eq!(json, "3000");
    }

    #[test]
    fn test_parse_seconds() {
        let d = parse_duration("29.5s").unwrap();
        assert_eq!(d, Duration::from_millis(29_500));
    }

    #[test]
    fn test_parse_milliseconds() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_microseconds() {
        assert_eq!(parse_duration("16µs").unwrap(), Duration::from_micros(16));
        assert_eq!(parse_duration("500us").unwrap(), Duration::from_micros(500));
    }

    #[test]
    fn test_parse_minutes_and_hours() {
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert!(matches!(
            parse_duration("ten seconds"),
            Err(DurationError::InvalidValue(_)) | Err(DurationError::UnknownUnit(_))
        ));
        assert!(matches!(
            parse_duration("-5s"),
            Err(DurationError::InvalidValue(_))
        ));
        assert!(matches!(
            parse_duration("5d"),
            Err(DurationError::UnknownUnit(_))
        ));
    }

    #[test]
    fn format_round_trips_through_parse() {
        for d in [
            Duration::from_secs(10),
            Duration::from_millis(250),
            Duration::from_micros(42),
            Duration::from_nanos(7),
            Duration::ZERO,
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn humanized_accepts_string_and_integer() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(with = "humanized")]
            period: Duration,
            #[serde(default, with = "humanized::option")]
            timeout: Option<Duration>,
        }

        let w: Wrapper = serde_json::from_str(r#"{"period": "10ms"}"#).unwrap();
        assert_eq!(w.period, Duration::from_millis(10));
        assert_eq!(w.timeout, None);

        let w: Wrapper = serde_json::from_str(r#"{"period": 5, "timeout": "1s"}"#).unwrap();
        assert_eq!(w.period, Duration::from_secs(5));
        assert_eq!(w.timeout, Some(Duration::from_secs(1)));

        assert!(serde_json::from_str::<Wrapper>(r#"{"period": "soon"}"#).is_err());
    }
}
