//! # bootkit
//!
//! Shared utilities for the bootkit crates.
//!
//! Provides layered configuration loading, the host [`LaunchMode`] and
//! logging initialization used by `bootkit-grpc`.
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization with tracing-subscriber

mod config;
mod launch_mode;
mod logging;

pub use config::{ConfigBuilder, ConfigError, ConfigFormat};
pub use launch_mode::LaunchMode;
pub use logging::LogFormat;

#[cfg(feature = "tracing")]
pub use logging::{init_logging, init_logging_for, init_logging_from_env};
