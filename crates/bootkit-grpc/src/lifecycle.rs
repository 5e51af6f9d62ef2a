//! Socket ownership, server start and stop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;

use crate::descriptor::ServerDescriptor;
use crate::error::{BindError, Result};
use crate::registry::Bindings;
use crate::shutdown::{ShutdownFuture, ShutdownRegistrar};

#[cfg(feature = "health")]
use crate::health::{self, HealthReporter, ServingStatus};

type ServeResult = std::result::Result<(), tonic::transport::Error>;

/// Opaque reference to a running server.
///
/// Cheap to clone and safe to use from any task or thread. Dropping every
/// handle does not stop the server; use [`ServerHandle::stop`] or the
/// registered shutdown callback.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Running>,
}

struct Running {
    local_addr: SocketAddr,
    trigger: SyncMutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<ServeResult>>>,
    bindings: SyncMutex<Option<Bindings>>,
    stopped: AtomicBool,
    #[cfg(feature = "health")]
    health: HealthReporter,
}

impl ServerHandle {
    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the server and wait until the listening socket is released.
    ///
    /// Idempotent: later and concurrent calls return once the first stop has
    /// completed.
    pub async fn stop(&self) {
        let mut task = self.inner.task.lock().await;
        let Some(serve) = task.take() else {
            return;
        };

        #[cfg(feature = "health")]
        {
            let mut reporter = self.inner.health.clone();
            let names = self.service_names();
            health::report(
                &mut reporter,
                names.iter().map(String::as_str),
                ServingStatus::NotServing,
            )
            .await;
        }

        let trigger = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(trigger) = trigger {
            let _ = trigger.send(());
        }

        match serve.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "gRPC server exited with error"),
            Err(err) => tracing::error!(error = %err, "gRPC server task failed"),
        }

        self.inner
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.stopped.store(true, Ordering::Release);

        tracing::info!(addr = %self.inner.local_addr, "gRPC server shutdown complete");
    }

    #[cfg(feature = "health")]
    fn service_names(&self) -> Vec<String> {
        self.inner
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|b| b.service_names().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.inner.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Open the listener, attach every bound service and register the stop
/// callback with `registrar`.
///
/// The callback is registered last; if anything before fails nothing is left
/// registered and the socket is closed.
pub(crate) async fn start(
    descriptor: &ServerDescriptor,
    bindings: Bindings,
    registrar: &dyn ShutdownRegistrar,
) -> Result<ServerHandle> {
    let transport = descriptor.transport();

    let mut server = Server::builder()
        .max_concurrent_streams(transport.max_concurrent_streams)
        .http2_keepalive_interval(transport.http2_keepalive_interval);
    if let Some(timeout) = transport.request_timeout {
        server = server.timeout(timeout);
    }

    #[cfg(feature = "tls")]
    if let Some(tls) = descriptor.tls() {
        server = server
            .tls_config(load_tls(tls)?)
            .map_err(|e| crate::Error::Tls(e.to_string()))?;
    }

    let addr = descriptor.addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| BindError::Socket { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| BindError::Socket { addr, source })?;

    let mut routes = RoutesBuilder::default();
    for service in bindings.services() {
        service.instance().attach(&mut routes);
    }

    #[cfg(feature = "health")]
    let health = {
        let (mut reporter, health_service) = health::health_service();
        health::report(&mut reporter, bindings.service_names(), ServingStatus::Serving).await;
        routes.add_service(health_service);
        reporter
    };

    let mut server = server.layer(tonic::service::interceptor(bindings.interceptor_chain()));
    let router = server.add_routes(routes.routes());

    let nodelay = transport.tcp_nodelay;
    let incoming = TcpListenerStream::new(listener).map(move |conn| {
        let conn = conn?;
        conn.set_nodelay(nodelay)?;
        Ok::<_, std::io::Error>(conn)
    });

    let (trigger, shutdown) = oneshot::channel::<()>();
    let task = tokio::spawn(router.serve_with_incoming_shutdown(incoming, async move {
        let _ = shutdown.await;
    }));

    tracing::info!(
        addr = %local_addr,
        services = bindings.services().len(),
        interceptors = bindings.interceptors().len(),
        tls = descriptor.tls_enabled(),
        "gRPC server listening"
    );

    let handle = ServerHandle {
        inner: Arc::new(Running {
            local_addr,
            trigger: SyncMutex::new(Some(trigger)),
            task: Mutex::new(Some(task)),
            bindings: SyncMutex::new(Some(bindings)),
            stopped: AtomicBool::new(false),
            #[cfg(feature = "health")]
            health,
        }),
    };

    let on_shutdown = handle.clone();
    registrar.register(Box::new(move || -> ShutdownFuture {
        Box::pin(async move { on_shutdown.stop().await })
    }));

    Ok(handle)
}

#[cfg(feature = "tls")]
fn load_tls(tls: &crate::descriptor::TlsSource) -> Result<tonic::transport::ServerTlsConfig> {
    use crate::error::Error;

    let read = |path: &std::path::Path| {
        std::fs::read(path).map_err(|e| Error::Tls(format!("{}: {}", path.display(), e)))
    };

    let identity = tonic::transport::Identity::from_pem(read(tls.cert_path())?, read(tls.key_path())?);
    let mut config = tonic::transport::ServerTlsConfig::new().identity(identity);

    if let Some(ca) = tls.client_ca_path() {
        config = config.client_ca_root(tonic::transport::Certificate::from_pem(read(ca)?));
    }

    Ok(config)
}
