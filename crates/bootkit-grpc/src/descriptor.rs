//! The frozen server descriptor assembled before any socket exists.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bootkit::LaunchMode;

use crate::config::GrpcConfig;
use crate::discovery::{CandidateSet, ServiceCandidate};
use crate::error::{ConfigurationError, Result};

/// Where the server certificate comes from. Presence only; nothing is read
/// until start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSource {
    cert_path: PathBuf,
    key_path: PathBuf,
    client_ca_path: Option<PathBuf>,
}

impl TlsSource {
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn client_ca_path(&self) -> Option<&Path> {
        self.client_ca_path.as_deref()
    }
}

/// Transport tuning copied from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub request_timeout: Option<Duration>,
    pub max_concurrent_streams: Option<u32>,
    pub http2_keepalive_interval: Option<Duration>,
    pub tcp_nodelay: bool,
}

/// Immutable snapshot consumed by the start phase.
///
/// There is no mutating API: once [`Bootstrap::prepare`](crate::Bootstrap::prepare)
/// returns, the descriptor is only ever shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    addr: SocketAddr,
    launch_mode: LaunchMode,
    tls: Option<TlsSource>,
    transport: Transport,
    services: Vec<ServiceCandidate>,
    interceptors: Vec<ServiceCandidate>,
}

impl ServerDescriptor {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.launch_mode
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn tls(&self) -> Option<&TlsSource> {
        self.tls.as_ref()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn services(&self) -> &[ServiceCandidate] {
        &self.services
    }

    /// Interceptors, outermost first.
    pub fn interceptors(&self) -> &[ServiceCandidate] {
        &self.interceptors
    }

    pub fn contains(&self, candidate: &ServiceCandidate) -> bool {
        self.services.contains(candidate) || self.interceptors.contains(candidate)
    }
}

/// Build the descriptor from static configuration and discovered candidates.
///
/// Pure: performs no I/O and opens no socket.
pub(crate) fn prepare(config: &GrpcConfig, candidates: &CandidateSet) -> Result<ServerDescriptor> {
    let addr = socket_addr(&config.host, config.port)?;
    let tls = tls_source(config)?;

    let services: Vec<ServiceCandidate> = candidates.services().cloned().collect();

    let mut interceptors: Vec<ServiceCandidate> = candidates.interceptors().cloned().collect();
    // Stable: equal priorities keep discovery order.
    interceptors.sort_by_key(ServiceCandidate::priority);

    let descriptor = ServerDescriptor {
        addr,
        launch_mode: config.launch_mode,
        tls,
        transport: Transport {
            request_timeout: config.request_timeout(),
            max_concurrent_streams: config.max_concurrent_streams,
            http2_keepalive_interval: config.http2_keepalive_interval(),
            tcp_nodelay: config.tcp_nodelay,
        },
        services,
        interceptors,
    };

    tracing::debug!(
        addr = %descriptor.addr,
        launch_mode = %descriptor.launch_mode,
        tls = descriptor.tls_enabled(),
        services = descriptor.services.len(),
        interceptors = descriptor.interceptors.len(),
        "gRPC server descriptor prepared"
    );

    Ok(descriptor)
}

fn socket_addr(host: &str, port: u32) -> Result<SocketAddr, ConfigurationError> {
    let port = match u16::try_from(port) {
        Ok(0) | Err(_) => return Err(ConfigurationError::PortOutOfRange(port)),
        Ok(port) => port,
    };

    let ip: IpAddr = host
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|_| ConfigurationError::InvalidHost(host.to_string()))?;

    Ok(SocketAddr::new(ip, port))
}

fn tls_source(config: &GrpcConfig) -> Result<Option<TlsSource>, ConfigurationError> {
    if !config.tls_effective() {
        return Ok(None);
    }

    let cert_path = config
        .tls_cert_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ConfigurationError::MissingCertificate {
            missing: "tls_cert_path",
        })?;
    let key_path = config
        .tls_key_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ConfigurationError::MissingCertificate {
            missing: "tls_key_path",
        })?;

    if !cfg!(feature = "tls") {
        return Err(ConfigurationError::TlsUnsupported);
    }

    Ok(Some(TlsSource {
        cert_path: PathBuf::from(cert_path),
        key_path: PathBuf::from(key_path),
        client_ca_path: config.tls_ca_path.as_deref().map(PathBuf::from),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{discover, TypeMetadata, TypeRegistry};
    use crate::error::Error;

    fn config(port: u32) -> GrpcConfig {
        GrpcConfig {
            launch_mode: LaunchMode::Test,
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        }
    }

    fn candidates() -> CandidateSet {
        discover(
            &TypeRegistry::new()
                .service("greeter.Greeter")
                .interceptor("i.A")
                .register(TypeMetadata::new("i.B").interceptor().priority(-1))
                .interceptor("i.C"),
        )
        .unwrap()
    }

    #[test]
    fn prepares_descriptor() {
        let descriptor = prepare(&config(9000), &candidates()).unwrap();

        assert_eq!(descriptor.addr().to_string(), "127.0.0.1:9000");
        assert_eq!(descriptor.port(), 9000);
        assert!(!descriptor.tls_enabled());
        assert_eq!(descriptor.launch_mode(), LaunchMode::Test);
        assert_eq!(descriptor.services().len(), 1);
        assert!(descriptor.transport().tcp_nodelay);
    }

    #[test]
    fn interceptors_sorted_by_priority_then_discovery_order() {
        let descriptor = prepare(&config(9000), &candidates()).unwrap();

        let order: Vec<_> = descriptor.interceptors().iter().map(|c| c.type_id()).collect();
        assert_eq!(order, ["i.B", "i.A", "i.C"]);
    }

    #[test]
    fn port_bounds() {
        for port in [0, 65536, 100_000] {
            let err = prepare(&config(port), &CandidateSet::default()).unwrap_err();
            assert!(matches!(
                err,
                Error::Configuration(ConfigurationError::PortOutOfRange(p)) if p == port
            ));
        }
        assert!(prepare(&config(1), &CandidateSet::default()).is_ok());
        assert!(prepare(&config(65535), &CandidateSet::default()).is_ok());
    }

    #[test]
    fn default_port_is_8888() {
        let config = GrpcConfig {
            launch_mode: LaunchMode::Test,
            ..Default::default()
        };
        let descriptor = prepare(&config, &CandidateSet::default()).unwrap();
        assert_eq!(descriptor.port(), 8888);
    }

    #[test]
    fn accepts_ipv6_hosts() {
        for host in ["::1", "[::1]"] {
            let config = GrpcConfig {
                host: host.to_string(),
                ..config(50051)
            };
            let descriptor = prepare(&config, &CandidateSet::default()).unwrap();
            assert_eq!(descriptor.addr().to_string(), "[::1]:50051");
        }
    }

    #[test]
    fn rejects_hostnames() {
        let config = GrpcConfig {
            host: "not-an-ip".to_string(),
            ..config(50051)
        };
        assert!(matches!(
            prepare(&config, &CandidateSet::default()),
            Err(Error::Configuration(ConfigurationError::InvalidHost(_)))
        ));
    }

    #[test]
    fn tls_without_certificate_is_rejected() {
        let config = GrpcConfig {
            tls_enabled: Some(true),
            ..config(9443)
        };
        assert!(matches!(
            prepare(&config, &CandidateSet::default()),
            Err(Error::Configuration(ConfigurationError::MissingCertificate {
                missing: "tls_cert_path"
            }))
        ));

        let config = GrpcConfig {
            tls_cert_path: Some("/etc/grpc/cert.pem".to_string()),
            ..config
        };
        assert!(matches!(
            prepare(&config, &CandidateSet::default()),
            Err(Error::Configuration(ConfigurationError::MissingCertificate {
                missing: "tls_key_path"
            }))
        ));
    }

    #[test]
    fn normal_launch_mode_demands_tls() {
        let config = GrpcConfig {
            launch_mode: LaunchMode::Normal,
            ..config(9443)
        };
        assert!(matches!(
            prepare(&config, &CandidateSet::default()),
            Err(Error::Configuration(ConfigurationError::MissingCertificate { .. }))
        ));

        let config = GrpcConfig {
            tls_enabled: Some(false),
            ..config
        };
        assert!(!prepare(&config, &CandidateSet::default()).unwrap().tls_enabled());
    }

    #[cfg(feature = "tls")]
    #[test]
    fn tls_source_is_recorded() {
        let config = GrpcConfig {
            tls_enabled: Some(true),
            tls_cert_path: Some("/etc/grpc/cert.pem".to_string()),
            tls_key_path: Some("/etc/grpc/key.pem".to_string()),
            ..config(9443)
        };
        let descriptor = prepare(&config, &CandidateSet::default()).unwrap();
        let tls = descriptor.tls().unwrap();
        assert_eq!(tls.cert_path(), Path::new("/etc/grpc/cert.pem"));
        assert_eq!(tls.client_ca_path(), None);
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn tls_requires_feature() {
        let config = GrpcConfig {
            tls_enabled: Some(true),
            tls_cert_path: Some("/etc/grpc/cert.pem".to_string()),
            tls_key_path: Some("/etc/grpc/key.pem".to_string()),
            ..config(9443)
        };
        assert!(matches!(
            prepare(&config, &CandidateSet::default()),
            Err(Error::Configuration(ConfigurationError::TlsUnsupported))
        ));
    }
}
