//! Phase controller driving discovery, prepare, start and stop.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;

use crate::config::GrpcConfig;
use crate::descriptor::{self, ServerDescriptor};
use crate::discovery::{self, CandidateSet, MetadataSource};
use crate::error::{Error, Result};
use crate::lifecycle::{self, ServerHandle};
use crate::registry;
use crate::resolver::Resolver;
use crate::shutdown::{ShutdownCallback, ShutdownFuture, ShutdownRegistrar};

/// Externally observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Uninitialized,
    Prepared,
    Started,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Prepared => write!(f, "prepared"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

enum State {
    Uninitialized {
        candidates: Option<CandidateSet>,
    },
    Prepared {
        descriptor: Arc<ServerDescriptor>,
    },
    Started {
        descriptor: Arc<ServerDescriptor>,
        handle: ServerHandle,
    },
    Stopped {
        descriptor: Arc<ServerDescriptor>,
    },
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            Self::Uninitialized { .. } => Phase::Uninitialized,
            Self::Prepared { .. } => Phase::Prepared,
            Self::Started { .. } => Phase::Started,
            Self::Stopped { .. } => Phase::Stopped,
        }
    }

    fn descriptor(&self) -> Option<&Arc<ServerDescriptor>> {
        match self {
            Self::Uninitialized { .. } => None,
            Self::Prepared { descriptor }
            | Self::Started { descriptor, .. }
            | Self::Stopped { descriptor } => Some(descriptor),
        }
    }

    fn mark_stopped(&mut self) {
        if let Self::Started { descriptor, .. } = self {
            let descriptor = Arc::clone(descriptor);
            tracing::info!(phase = %Phase::Stopped, "gRPC server stopped by shutdown callback");
            *self = Self::Stopped { descriptor };
        }
    }
}

/// Forwards to the host registrar; each callback also moves the controller
/// to `Stopped` once the server is down.
struct ControllerRegistrar<'a> {
    state: Weak<Mutex<State>>,
    inner: &'a dyn ShutdownRegistrar,
}

impl ShutdownRegistrar for ControllerRegistrar<'_> {
    fn register(&self, callback: ShutdownCallback) {
        let state = self.state.clone();
        self.inner.register(Box::new(move || -> ShutdownFuture {
            Box::pin(async move {
                callback().await;
                if let Some(state) = state.upgrade() {
                    state.lock().await.mark_stopped();
                }
            })
        }));
    }
}

/// Drives one gRPC server through its phases.
///
/// Every operation holds the state lock for its whole duration, so calls from
/// different tasks are serialized and each sees the phase left by the
/// previous one. The shutdown callback registered by
/// [`start`](Self::start) goes through the same lock.
///
/// # Example
///
/// ```ignore
/// let hooks = Arc::new(ShutdownHooks::new());
/// let bootstrap = Bootstrap::new(types, resolver, hooks.clone());
///
/// bootstrap.prepare(&GrpcConfig::from_env()?).await?;
/// bootstrap.start().await?;
///
/// hooks.run_on_signal().await;
/// ```
///
/// The individual steps are not reachable outside the controller:
///
/// ```compile_fail
/// let _ = bootkit_grpc::registry::bind;
/// ```
///
/// ```compile_fail
/// let _ = bootkit_grpc::lifecycle::start;
/// ```
///
/// ```compile_fail
/// let _ = bootkit_grpc::descriptor::prepare;
/// ```
pub struct Bootstrap {
    source: Box<dyn MetadataSource + Send + Sync>,
    resolver: Box<dyn Resolver>,
    registrar: Box<dyn ShutdownRegistrar>,
    state: Arc<Mutex<State>>,
}

impl Bootstrap {
    pub fn new(
        source: impl MetadataSource + Send + Sync + 'static,
        resolver: impl Resolver + 'static,
        registrar: impl ShutdownRegistrar + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            resolver: Box::new(resolver),
            registrar: Box::new(registrar),
            state: Arc::new(Mutex::new(State::Uninitialized { candidates: None })),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase()
    }

    /// The descriptor produced by [`prepare`](Self::prepare), if any.
    pub async fn descriptor(&self) -> Option<Arc<ServerDescriptor>> {
        self.state.lock().await.descriptor().cloned()
    }

    /// Bound address while the server is running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Started { handle, .. } => Some(handle.local_addr()),
            _ => None,
        }
    }

    /// Scan the metadata source and classify candidates.
    ///
    /// Only allowed before [`prepare`](Self::prepare). Calling it again
    /// rescans; `prepare` builds implicitly when it has not been called.
    pub async fn build(&self) -> Result<CandidateSet> {
        let mut state = self.state.lock().await;
        let State::Uninitialized { candidates } = &mut *state else {
            return Err(Error::phase_violation("build", state.phase()));
        };

        let found = discovery::discover(self.source.as_ref())?;
        tracing::debug!(
            services = found.services().count(),
            interceptors = found.interceptors().count(),
            "gRPC candidates discovered"
        );
        *candidates = Some(found.clone());
        Ok(found)
    }

    /// Freeze configuration and candidates into a descriptor.
    ///
    /// Runs at most once. A second call is a phase violation and leaves the
    /// first descriptor in place.
    pub async fn prepare(&self, config: &GrpcConfig) -> Result<Arc<ServerDescriptor>> {
        let mut state = self.state.lock().await;
        let candidates = match &mut *state {
            State::Uninitialized { candidates } => match candidates.take() {
                Some(found) => found,
                None => discovery::discover(self.source.as_ref())?,
            },
            other => return Err(Error::phase_violation("prepare", other.phase())),
        };

        let descriptor = match descriptor::prepare(config, &candidates) {
            Ok(descriptor) => Arc::new(descriptor),
            Err(err) => {
                *state = State::Uninitialized {
                    candidates: Some(candidates),
                };
                return Err(err);
            }
        };

        tracing::info!(
            addr = %descriptor.addr(),
            services = descriptor.services().len(),
            interceptors = descriptor.interceptors().len(),
            phase = %Phase::Prepared,
            "gRPC server prepared"
        );
        *state = State::Prepared {
            descriptor: Arc::clone(&descriptor),
        };
        Ok(descriptor)
    }

    /// Resolve every candidate, open the socket and begin serving.
    ///
    /// On failure the controller stays prepared and nothing is registered for
    /// shutdown, so `start` may be retried.
    pub async fn start(&self) -> Result<ServerHandle> {
        let mut state = self.state.lock().await;
        let descriptor = match &*state {
            State::Prepared { descriptor } => Arc::clone(descriptor),
            other => return Err(Error::phase_violation("start", other.phase())),
        };

        let bindings = registry::bind(&descriptor, self.resolver.as_ref()).inspect_err(|err| {
            tracing::error!(error = %err, "gRPC service binding failed");
        })?;
        let registrar = ControllerRegistrar {
            state: Arc::downgrade(&self.state),
            inner: self.registrar.as_ref(),
        };
        let handle = lifecycle::start(&descriptor, bindings, &registrar)
            .await
            .inspect_err(|err| tracing::error!(error = %err, "gRPC server failed to start"))?;

        *state = State::Started {
            descriptor,
            handle: handle.clone(),
        };
        Ok(handle)
    }

    /// Stop serving and release the socket.
    ///
    /// A no-op once stopped. Stopping a server that never started is a phase
    /// violation.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let (descriptor, handle) = match &*state {
            State::Started { descriptor, handle } => (Arc::clone(descriptor), handle.clone()),
            State::Stopped { .. } => return Ok(()),
            other => return Err(Error::phase_violation("stop", other.phase())),
        };

        handle.stop().await;
        *state = State::Stopped { descriptor };
        Ok(())
    }
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = self.state.try_lock().map(|s| s.phase()).ok();
        f.debug_struct("Bootstrap").field("phase", &phase).finish()
    }
}
