//! Tracing subscriber setup for MindQuest services.
//!
//! Call [`init_telemetry`] (human-readable) or [`init_json_telemetry`] (one
//! JSON object per event) once at process start. The filter is read from
//! `RUST_LOG` and defaults to `info`. Only the first call installs a
//! subscriber, even under concurrent calls; later calls are no-ops.
//! [`service_span`] is the root span that tags events with `service.name`.

use std::sync::OnceLock;

use tracing::{Span, info_span};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

#[cfg(test)]
mod test_init;

/// Filter directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

static SERVICE_NAME: OnceLock<String> = OnceLock::new();

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Pretty,
    /// Newline-delimited JSON with the current span list.
    Json,
}

/// Build the env filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber for `service_name`.
///
/// # Errors
///
/// Returns [`TryInitError`] if another library already installed a global
/// subscriber outside this crate.
pub fn init_telemetry(service_name: &str) -> Result<(), TryInitError> {
    init(service_name, LogFormat::Pretty)
}

/// Install a JSON subscriber for `service_name`.
///
/// # Errors
///
/// Returns [`TryInitError`] if another library already installed a global
/// subscriber outside this crate.
pub fn init_json_telemetry(service_name: &str) -> Result<(), TryInitError> {
    init(service_name, LogFormat::Json)
}

/// Service name recorded by the first initialisation.
pub fn service_name() -> Option<&'static str> {
    SERVICE_NAME.get().map(String::as_str)
}

/// Root span carrying `service.name`.
///
/// Enter it (or `instrument` the service's top-level futures with it) at the
/// entry point so every event below carries the service name. Before
/// initialisation the field is empty.
pub fn service_span() -> Span {
    info_span!("service", service.name = service_name().unwrap_or_default())
}

fn init(service_name: &str, format: LogFormat) -> Result<(), TryInitError> {
    let mut outcome = None;
    // Concurrent callers block here until the first install has finished.
    SERVICE_NAME.get_or_init(|| {
        outcome = Some(install(format));
        service_name.to_string()
    });
    let Some(outcome) = outcome else {
        return Ok(());
    };
    if outcome.is_ok() {
        let _root = service_span().entered();
        tracing::debug!(?format, "telemetry initialized");
    }
    outcome
}

fn install(format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter());
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true).with_span_list(true))
            .try_init(),
    }
}
