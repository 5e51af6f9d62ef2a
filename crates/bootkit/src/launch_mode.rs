//! Launch mode of the hosting application.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// How the host application was launched.
///
/// The mode selects defaults only: whether TLS is mandatory and which log
/// filter applies when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Normal,
    #[default]
    Development,
    Test,
}

impl FromStr for LaunchMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "normal" | "production" | "prod" => Self::Normal,
            "test" | "testing" => Self::Test,
            _ => Self::Development,
        })
    }
}

impl<'de> Deserialize<'de> for LaunchMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Infallible parse, unknown tags fall back to development.
        Ok(s.parse().unwrap_or_default())
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Development => "development",
            Self::Test => "test",
        })
    }
}

impl LaunchMode {
    /// Load from `LAUNCH_MODE`, then `APP_ENV`, then `RUST_ENV`.
    pub fn from_env() -> Self {
        env::var("LAUNCH_MODE")
            .or_else(|_| env::var("APP_ENV"))
            .or_else(|_| env::var("RUST_ENV"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }

    /// Whether TLS must be on when the configuration leaves it unset.
    pub fn requires_tls(&self) -> bool {
        self.is_normal()
    }

    /// Log filter used when `RUST_LOG` is absent.
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Self::Normal => "info",
            Self::Development => "debug",
            Self::Test => "warn",
        }
    }
}
