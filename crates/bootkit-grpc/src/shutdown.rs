//! Orderly-shutdown registration.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

pub type ShutdownFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Work to run once during orderly process shutdown.
pub type ShutdownCallback = Box<dyn FnOnce() -> ShutdownFuture + Send>;

/// External capability: "run this callback during orderly shutdown".
pub trait ShutdownRegistrar: Send + Sync {
    fn register(&self, callback: ShutdownCallback);
}

impl<R> ShutdownRegistrar for Arc<R>
where
    R: ShutdownRegistrar + ?Sized,
{
    fn register(&self, callback: ShutdownCallback) {
        (**self).register(callback)
    }
}

/// In-process registrar collecting callbacks until [`ShutdownHooks::run`].
///
/// # Example
///
/// ```ignore
/// let hooks = Arc::new(ShutdownHooks::new());
/// let bootstrap = Bootstrap::new(types, resolver, hooks.clone());
/// bootstrap.prepare(&config).await?;
/// bootstrap.start().await?;
///
/// hooks.run_on_signal().await;
/// ```
#[derive(Default)]
pub struct ShutdownHooks {
    callbacks: Mutex<Vec<ShutdownCallback>>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every registered callback, last registered first.
    ///
    /// Callbacks are drained, so a second call only runs ones registered since.
    pub async fn run(&self) {
        let callbacks = std::mem::take(&mut *self.lock());
        tracing::info!(callbacks = callbacks.len(), "running shutdown hooks");

        for callback in callbacks.into_iter().rev() {
            callback().await;
        }
    }

    /// Wait for SIGINT/SIGTERM, then [`run`](Self::run).
    pub async fn run_on_signal(&self) {
        shutdown_signal().await;
        self.run().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ShutdownCallback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShutdownRegistrar for ShutdownHooks {
    fn register(&self, callback: ShutdownCallback) {
        self.lock().push(callback);
    }
}

impl std::fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("callbacks", &self.len())
            .finish()
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM).
///
/// A signal whose handler cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
