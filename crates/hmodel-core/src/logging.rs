#![forbid(unsafe_code)]

//! Logging bootstrap.
//!
//! The library crates log through `tracing` and never install a subscriber
//! themselves. Applications and test binaries that want output call
//! [`init_logging`] (requires the `tracing-subscriber` feature). The filter is
//! read from `HMODEL_LOG` using `EnvFilter` directive syntax and defaults to
//! `warn`.

use std::fmt;

/// Environment variable holding the filter directive.
pub const ENV_LOG: &str = "HMODEL_LOG";

/// Filter applied when `HMODEL_LOG` is unset or malformed.
pub const DEFAULT_FILTER: &str = "warn";

/// Output format for [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line records.
    #[default]
    Plain,
    /// One JSON object per record.
    Json,
}

impl LogFormat {
    /// Parse `plain` or `json` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Failure to install the global subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingError {
    pub message: String,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to install log subscriber: {}", self.message)
    }
}

impl std::error::Error for LoggingError {}

/// Install a global `tracing` subscriber.
///
/// Fails if a global subscriber already exists; an existing subscriber is
/// never replaced.
#[cfg(feature = "tracing-subscriber")]
pub fn init_logging(format: LogFormat) -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| LoggingError {
        message: err.to_string(),
    })?;
    tracing::debug!(?format, "log subscriber installed");
    Ok(())
}
