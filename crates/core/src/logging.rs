//! Logging infrastructure for the Mitra assistant.
//!
//! All events go to stderr so stdout stays clean for answers and `--json`
//! output. The filter comes from the settings, then `RUST_LOG`, then `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{AppError, AppResult};

const DEFAULT_FILTER: &str = "info";

/// Build the event filter. An explicit level wins over `RUST_LOG`.
pub fn build_filter(log_level: Option<&str>) -> AppResult<EnvFilter> {
    let from_env = std::env::var("RUST_LOG").ok();
    let directives = log_level
        .or(from_env.as_deref())
        .unwrap_or(DEFAULT_FILTER);

    EnvFilter::try_new(directives).map_err(|e| {
        AppError::InvalidConfiguration(format!("Invalid log filter '{}': {}", directives, e))
    })
}

/// Install the global subscriber.
///
/// # Example
/// ```no_run
/// use mitra_core::{logging::init_logging, Settings};
///
/// let settings = Settings::default();
/// init_logging(&settings.logging, settings.no_color).expect("Failed to initialize logging");
/// ```
pub fn init_logging(logging: &LoggingSettings, no_color: bool) -> AppResult<()> {
    let filter = build_filter(logging.level.as_deref())?;

    let layer = if logging.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed()
    } else {
        let ansi = !no_color && std::env::var_os("NO_COLOR").is_none();
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(ansi)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| AppError::InvalidConfiguration(format!("Failed to init logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        let result = build_filter(Some("mitra=[=bogus"));
        assert!(matches!(result, Err(AppError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_explicit_level_is_used() {
        let filter = build_filter(Some("mitra_knowledge=trace")).unwrap();
        assert!(filter.to_string().contains("mitra_knowledge=trace"));
    }
}
