//! Global tracing subscriber setup.

use std::env;
use std::str::FromStr;

#[cfg(feature = "tracing")]
use crate::LaunchMode;

/// Output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format = if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else if s.eq_ignore_ascii_case("compact") {
            Self::Compact
        } else {
            Self::Text
        };
        Ok(format)
    }
}

impl LogFormat {
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT") {
            Ok(value) => value.parse().unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }
}

/// Install the global subscriber.
///
/// `default_filter` applies only when `RUST_LOG` is unset. If a subscriber is
/// already installed this does nothing.
#[cfg(feature = "tracing")]
pub fn init_logging(format: LogFormat, default_filter: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter, Registry};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = Registry::default().with(filter);

    let installed = match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(?format, filter = default_filter, "logging initialized");
    }
}

/// [`init_logging`] with `LOG_FORMAT` and an `info` default filter.
#[cfg(feature = "tracing")]
pub fn init_logging_from_env() {
    init_logging(LogFormat::from_env(), "info");
}

/// [`init_logging`] with `LOG_FORMAT` and the default filter of `mode`.
#[cfg(feature = "tracing")]
pub fn init_logging_for(mode: LaunchMode) {
    init_logging(LogFormat::from_env(), mode.default_log_filter());
}
