//! Error types for module construction, fetching and publishing.

use std::fmt;

use thiserror::Error;

/// Boxed error returned by metricset factories and publisher backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while turning configuration into running modules.
#[derive(Debug, Error)]
pub enum Error {
    /// No metricsets are registered under this module name.
    #[error("module '{0}' is not registered")]
    UnknownModule(String),

    /// The module exists but does not provide this metricset.
    #[error("metricset '{module}/{metricset}' is not registered")]
    UnknownMetricSet { module: String, metricset: String },

    /// A metricset factory was registered twice.
    #[error("metricset '{module}/{metricset}' is already registered")]
    DuplicateMetricSet { module: String, metricset: String },

    /// The module configuration is malformed.
    #[error("invalid module config: {0}")]
    InvalidConfig(String),

    /// A metricset factory refused to build an instance.
    #[error("failed to create metricset '{module}/{metricset}' for host '{host}': {source}")]
    MetricSetInit {
        module: String,
        metricset: String,
        host: String,
        #[source]
        source: BoxError,
    },

    /// A filter rule could not be compiled.
    #[error("invalid filter: {0}")]
    Filter(String),

    /// An event could not be assembled.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The publisher could not hand out a client.
    #[error("publisher connect failed: {0}")]
    Publisher(String),

    /// A module runner was started twice.
    #[error("module '{0}' was already started")]
    AlreadyStarted(String),

    /// Several independent failures collected from one batch.
    #[error("{}", MultiDisplay(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is only one, `Multiple` otherwise.
    pub fn from_many(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors)),
        }
    }
}

struct MultiDisplay<'a>(&'a [Error]);

impl fmt::Display for MultiDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.0.len())?;
        for err in self.0 {
            write!(f, "\n\t* {}", err)?;
        }
        Ok(())
    }
}

/// Errors a metricset reports from a single fetch.
///
/// These never stop a fetch loop; they are turned into events carrying
/// the error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch failed for a metricset-specific reason.
    #[error("{0}")]
    Failed(String),

    /// The monitored endpoint could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The fetch did not finish within the module timeout.
    #[error("fetch timed out")]
    Timeout,

    /// The metricset panicked while fetching.
    #[error("fetch panicked: {0}")]
    Panicked(String),
}

impl FetchError {
    /// Convenience constructor for metricset-specific failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        FetchError::Failed(reason.into())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => FetchError::Timeout,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => FetchError::Connection(err.to_string()),
            _ => FetchError::Failed(err.to_string()),
        }
    }
}
