//! The service-invocation contract bound services must satisfy.

use std::convert::Infallible;
use std::fmt;

use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tower::Service;

/// A server-side method set the runtime can route requests to.
///
/// Most implementations wrap a tonic-generated server in [`TonicService`].
pub trait GrpcService: Send + Sync + 'static {
    /// Fully-qualified service name, e.g. `greeter.Greeter`.
    fn name(&self) -> &str;

    /// Add the service's routes to the server being assembled.
    fn attach(&self, routes: &mut RoutesBuilder);
}

/// Adapter for any tonic-generated `*Server<T>`.
///
/// ```ignore
/// let greeter = Instance::service(TonicService::new(GreeterServer::new(MyGreeter)));
/// ```
#[derive(Clone)]
pub struct TonicService<S> {
    inner: S,
}

impl<S> TonicService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> GrpcService for TonicService<S>
where
    S: Service<http::Request<BoxBody>, Response = http::Response<BoxBody>, Error = Infallible>
        + NamedService
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn name(&self) -> &str {
        S::NAME
    }

    fn attach(&self, routes: &mut RoutesBuilder) {
        routes.add_service(self.inner.clone());
    }
}

impl<S> fmt::Debug for TonicService<S>
where
    S: NamedService,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicService").field("name", &S::NAME).finish()
    }
}

/// Check that `name` can be routed as `/{name}/{method}`.
pub(crate) fn validate_service_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("service name is empty".to_string());
    }
    if let Some(c) = name.chars().find(|c| *c == '/' || c.is_whitespace()) {
        return Err(format!("service name `{name}` contains invalid character {c:?}"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(format!("service name `{name}` has an empty package segment"));
    }
    Ok(())
}
