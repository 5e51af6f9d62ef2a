//! Interceptors and the runtime interceptor chain.

use std::fmt;
use std::sync::Arc;

use tonic::{Request, Status};

/// A chain-composable hook invoked around every request.
///
/// Closures of the shape `Fn(Request<()>) -> Result<Request<()>, Status>`
/// implement this trait directly.
///
/// # Example
///
/// ```ignore
/// use bootkit_grpc::{Instance, Status};
///
/// let require_tenant = Instance::interceptor(|req: tonic::Request<()>| {
///     if req.metadata().contains_key("x-tenant") {
///         Ok(req)
///     } else {
///         Err(Status::invalid_argument("missing x-tenant"))
///     }
/// });
/// ```
pub trait GrpcInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: Request<()>) -> Result<Request<()>, Status>;
}

impl<F> GrpcInterceptor for F
where
    F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
{
    fn intercept(&self, request: Request<()>) -> Result<Request<()>, Status> {
        self(request)
    }
}

/// Ordered interceptors applied as one tonic [`tonic::service::Interceptor`].
///
/// The first link is outermost: it sees the request first and may reject it
/// before later links run.
#[derive(Clone)]
pub struct InterceptorChain {
    links: Arc<[Arc<dyn GrpcInterceptor>]>,
}

impl InterceptorChain {
    pub fn new(links: impl IntoIterator<Item = Arc<dyn GrpcInterceptor>>) -> Self {
        Self {
            links: links.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Run every link in order, stopping at the first rejection.
    pub fn apply(&self, request: Request<()>) -> Result<Request<()>, Status> {
        self.links
            .iter()
            .try_fold(request, |req, link| link.intercept(req))
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.links.len())
            .finish()
    }
}

impl tonic::service::Interceptor for InterceptorChain {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.apply(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tonic::Code;

    fn recording(
        label: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn GrpcInterceptor> {
        let log = Arc::clone(log);
        Arc::new(move |req: Request<()>| -> Result<Request<()>, Status> {
            log.lock().unwrap().push(label);
            Ok(req)
        })
    }

    #[test]
    fn chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new([
            recording("a", &log),
            recording("b", &log),
            recording("c", &log),
        ]);

        chain.apply(Request::new(())).unwrap();

        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn rejection_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let deny: Arc<dyn GrpcInterceptor> =
            Arc::new(|_req: Request<()>| -> Result<Request<()>, Status> {
                Err(Status::permission_denied("nope"))
            });
        let mut chain = InterceptorChain::new([recording("a", &log), deny, recording("c", &log)]);

        let status = tonic::service::Interceptor::call(&mut chain, Request::new(())).unwrap_err();

        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(*log.lock().unwrap(), ["a"]);
    }

    #[test]
    fn links_see_earlier_mutations() {
        let tag: Arc<dyn GrpcInterceptor> = Arc::new(|mut req: Request<()>| -> Result<Request<()>, Status> {
            req.metadata_mut().insert("x-tag", "outer".parse().unwrap());
            Ok(req)
        });
        let check: Arc<dyn GrpcInterceptor> = Arc::new(|req: Request<()>| -> Result<Request<()>, Status> {
            match req.metadata().get("x-tag") {
                Some(_) => Ok(req),
                None => Err(Status::internal("tag missing")),
            }
        });

        let chain = InterceptorChain::new([tag, check]);
        assert!(chain.apply(Request::new(())).is_ok());
    }

    #[test]
    fn empty_chain_passes_through() {
        let chain = InterceptorChain::default();
        assert!(chain.is_empty());
        assert!(chain.apply(Request::new(())).is_ok());
    }
}
