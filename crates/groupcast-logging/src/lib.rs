//! # groupcast-logging
//!
//! Installs the process-wide `tracing` subscriber: an [`EnvFilter`] built from
//! `RUST_LOG` (or the configured level) feeding a pretty or JSON fmt layer.

#![deny(unsafe_code)]

use groupcast_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Failure to install the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter {directive:?}: {source}")]
    InvalidFilter {
        /// Directive that failed to parse.
        directive: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already set.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Default directive for the configured level.
///
/// Our own crates log at `level`; dependencies stay at `warn` unless the
/// level already names targets explicitly.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        return "info".to_string();
    }
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("warn,groupcast={level},groupcast_core={level},groupcast_server={level},tower_http={level}")
}

/// Build the filter, preferring `RUST_LOG` when set.
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = filter_directive(&settings.level);
    EnvFilter::try_new(&directive).map_err(|source| LoggingError::InvalidFilter { directive, source })
}

/// Initialize logging. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(settings)?;

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_scopes_to_own_crates() {
        let d = filter_directive("debug");
        assert!(d.starts_with("warn,"));
        assert!(d.contains("groupcast_core=debug"));
        assert!(d.contains("groupcast_server=debug"));
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(filter_directive("groupcast_core=trace"), "groupcast_core=trace");
        assert_eq!(filter_directive("info,hyper=debug"), "info,hyper=debug");
    }

    #[test]
    fn empty_level_defaults_to_info() {
        assert_eq!(filter_directive("  "), "info");
    }

    #[test]
    fn directives_parse() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(EnvFilter::try_new(filter_directive(level)).is_ok(), "{level}");
        }
    }

    #[test]
    fn garbage_level_is_rejected() {
        let settings = LoggingSettings {
            level: "groupcast=notalevel".into(),
            format: LogFormat::Pretty,
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(
                build_filter(&settings),
                Err(LoggingError::InvalidFilter { .. })
            ));
        }
    }
}
