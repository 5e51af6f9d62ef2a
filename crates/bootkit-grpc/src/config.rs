//! gRPC server configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use bootkit::{ConfigBuilder, ConfigError, LaunchMode};

/// Default listening port when none is configured.
pub const DEFAULT_PORT: u32 = 8888;

/// Static gRPC server configuration, read once at prepare time.
///
/// `port` is kept wide so out-of-range values reach validation instead of
/// failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub launch_mode: LaunchMode,
    pub host: String,
    pub port: u32,
    /// Explicit TLS switch. When unset the launch mode decides.
    pub tls_enabled: Option<bool>,
    /// Path to TLS certificate (PEM format).
    pub tls_cert_path: Option<String>,
    /// Path to TLS private key (PEM format).
    pub tls_key_path: Option<String>,
    /// Path to CA certificate for client authentication (PEM format).
    pub tls_ca_path: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Maximum concurrent streams per connection.
    pub max_concurrent_streams: Option<u32>,
    /// HTTP/2 keep-alive ping interval in seconds.
    pub http2_keepalive_interval_secs: Option<u64>,
    /// Enable TCP nodelay on accepted connections.
    pub tcp_nodelay: bool,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            launch_mode: LaunchMode::default(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls_enabled: None,
            tls_cert_path: None,
            tls_key_path: None,
            tls_ca_path: None,
            request_timeout_secs: None,
            max_concurrent_streams: None,
            http2_keepalive_interval_secs: None,
            tcp_nodelay: true,
        }
    }
}

impl GrpcConfig {
    /// Configuration builder reading `GRPC_*` environment variables.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config: GrpcConfig = GrpcConfig::builder()
    ///     .with_dotenv()
    ///     .with_config_file("grpc.toml")
    ///     .build()?;
    /// ```
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new().with_env_prefix("GRPC")
    }

    /// Load from `.env` and the `GRPC_*` environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().with_dotenv().build()
    }

    /// Whether TLS is on once the launch mode default is applied.
    pub fn tls_effective(&self) -> bool {
        self.tls_enabled
            .unwrap_or_else(|| self.launch_mode.requires_tls())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn http2_keepalive_interval(&self) -> Option<Duration> {
        self.http2_keepalive_interval_secs.map(Duration::from_secs)
    }
}

impl AsRef<GrpcConfig> for GrpcConfig {
    fn as_ref(&self) -> &GrpcConfig {
        self
    }
}
