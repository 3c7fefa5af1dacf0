//! Structured telemetry initialisation for harness runs.

use std::io::{self, IsTerminal};

use logrig_config::{HarnessSettings, LogFormat};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching global
/// state, so every test may call this from its set-up.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when another subscriber is already
/// installed.
pub fn initialise(settings: &HarnessSettings) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(settings))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(settings: &HarnessSettings) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(settings.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match settings.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_filters() {
        let settings = HarnessSettings {
            log_filter: Some("logrig=[".to_owned()),
            ..HarnessSettings::default()
        };
        let error = install_subscriber(&settings).expect_err("filter must be rejected");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }
}
