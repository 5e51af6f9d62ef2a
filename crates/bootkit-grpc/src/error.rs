//! Error taxonomy of the bootstrap sequence.

use std::io;
use std::net::SocketAddr;

use crate::bootstrap::Phase;
use crate::discovery::Capability;
use crate::resolver::ResolveError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Crate-level error type.
///
/// Every variant except [`Error::PhaseViolation`] carries enough detail (type
/// identifier, address) for the host to log it and abort startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A type carries both the service and the interceptor marker.
    #[error("type `{type_id}` is marked both as a gRPC service and as an interceptor")]
    AmbiguousRole { type_id: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A lifecycle operation was called out of order. Always a caller bug.
    #[error("cannot {operation} while the gRPC server is {phase}")]
    PhaseViolation {
        operation: &'static str,
        phase: Phase,
    },

    /// A resolved instance does not satisfy the contract its marker promised.
    #[error("`{type_id}` does not satisfy the {expected} contract: {reason}")]
    ContractMismatch {
        type_id: String,
        expected: Capability,
        reason: String,
    },

    #[error(transparent)]
    Bind(#[from] BindError),

    /// TLS material could not be loaded at start.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    pub(crate) fn phase_violation(operation: &'static str, phase: Phase) -> Self {
        Self::PhaseViolation { operation, phase }
    }

    pub(crate) fn contract_mismatch(
        type_id: impl Into<String>,
        expected: Capability,
        reason: impl Into<String>,
    ) -> Self {
        Self::ContractMismatch {
            type_id: type_id.into(),
            expected,
            reason: reason.into(),
        }
    }

    pub fn is_phase_violation(&self) -> bool {
        matches!(self, Self::PhaseViolation { .. })
    }

    /// Identifier of the offending type, when the error is about one.
    pub fn type_id(&self) -> Option<&str> {
        match self {
            Self::AmbiguousRole { type_id } | Self::ContractMismatch { type_id, .. } => {
                Some(type_id)
            }
            Self::Bind(BindError::Unresolved { type_id, .. }) => Some(type_id),
            _ => None,
        }
    }
}

/// Static configuration rejected at prepare time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("port {0} is outside the valid range 1-65535")]
    PortOutOfRange(u32),

    #[error("host `{0}` is not an IP address")]
    InvalidHost(String),

    #[error("TLS is enabled but `{missing}` is not configured")]
    MissingCertificate { missing: &'static str },

    #[error("TLS is enabled but this build does not include the `tls` feature")]
    TlsUnsupported,
}

/// Failures while binding candidates or the listening socket.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to bind gRPC listener on {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve `{type_id}`: {source}")]
    Unresolved {
        type_id: String,
        #[source]
        source: ResolveError,
    },
}

impl BindError {
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, Self::Socket { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}
