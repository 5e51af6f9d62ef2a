//! Binding descriptor candidates to live instances.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::ServerDescriptor;
use crate::discovery::{Capability, ServiceCandidate};
use crate::error::{BindError, Error, Result};
use crate::interceptor::{GrpcInterceptor, InterceptorChain};
use crate::resolver::{Instance, Resolver};
use crate::service::{validate_service_name, GrpcService};

/// A service candidate paired with its resolved instance.
#[derive(Clone)]
pub struct BoundService {
    candidate: ServiceCandidate,
    instance: Arc<dyn GrpcService>,
}

impl BoundService {
    pub fn candidate(&self) -> &ServiceCandidate {
        &self.candidate
    }

    pub fn instance(&self) -> &Arc<dyn GrpcService> {
        &self.instance
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }
}

impl fmt::Debug for BoundService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundService")
            .field("type_id", &self.candidate.type_id())
            .field("name", &self.instance.name())
            .finish()
    }
}

/// An interceptor candidate paired with its resolved instance.
#[derive(Clone)]
pub struct BoundInterceptor {
    candidate: ServiceCandidate,
    instance: Arc<dyn GrpcInterceptor>,
}

impl BoundInterceptor {
    pub fn candidate(&self) -> &ServiceCandidate {
        &self.candidate
    }

    pub fn instance(&self) -> &Arc<dyn GrpcInterceptor> {
        &self.instance
    }
}

impl fmt::Debug for BoundInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundInterceptor")
            .field("type_id", &self.candidate.type_id())
            .finish()
    }
}

/// Every binding produced by one successful start of the server.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    services: Vec<BoundService>,
    interceptors: Vec<BoundInterceptor>,
}

impl Bindings {
    pub fn services(&self) -> &[BoundService] {
        &self.services
    }

    /// Interceptors in descriptor order, outermost first.
    pub fn interceptors(&self) -> &[BoundInterceptor] {
        &self.interceptors
    }

    /// The runtime chain every request passes through.
    pub fn interceptor_chain(&self) -> InterceptorChain {
        InterceptorChain::new(self.interceptors.iter().map(|b| Arc::clone(&b.instance)))
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(BoundService::name)
    }
}

/// Resolve every candidate of `descriptor` through `resolver`.
///
/// All-or-nothing: the first failure aborts and no partial [`Bindings`] escape.
pub(crate) fn bind(descriptor: &ServerDescriptor, resolver: &dyn Resolver) -> Result<Bindings> {
    let mut services = Vec::with_capacity(descriptor.services().len());
    let mut names = HashSet::new();

    for candidate in descriptor.services() {
        let service = match resolve(candidate, resolver)? {
            Instance::Service(service) => service,
            other => return Err(mismatch(candidate, &other)),
        };

        validate_service_name(service.name())
            .map_err(|reason| Error::contract_mismatch(candidate.type_id(), Capability::Service, reason))?;

        #[cfg(feature = "health")]
        if service.name() == crate::health::HEALTH_SERVICE_NAME {
            return Err(Error::contract_mismatch(
                candidate.type_id(),
                Capability::Service,
                format!("service name `{}` is reserved for health checks", service.name()),
            ));
        }

        if !names.insert(service.name().to_string()) {
            return Err(Error::contract_mismatch(
                candidate.type_id(),
                Capability::Service,
                format!("service name `{}` is already bound", service.name()),
            ));
        }

        tracing::debug!(type_id = candidate.type_id(), name = service.name(), "service bound");
        services.push(BoundService {
            candidate: candidate.clone(),
            instance: service,
        });
    }

    let mut interceptors = Vec::with_capacity(descriptor.interceptors().len());
    for candidate in descriptor.interceptors() {
        let interceptor = match resolve(candidate, resolver)? {
            Instance::Interceptor(interceptor) => interceptor,
            other => return Err(mismatch(candidate, &other)),
        };

        tracing::debug!(type_id = candidate.type_id(), "interceptor bound");
        interceptors.push(BoundInterceptor {
            candidate: candidate.clone(),
            instance: interceptor,
        });
    }

    Ok(Bindings {
        services,
        interceptors,
    })
}

fn resolve(candidate: &ServiceCandidate, resolver: &dyn Resolver) -> Result<Instance> {
    resolver
        .resolve(candidate.type_id(), candidate.lifecycle())
        .map_err(|source| {
            Error::from(BindError::Unresolved {
                type_id: candidate.type_id().to_string(),
                source,
            })
        })
}

fn mismatch(candidate: &ServiceCandidate, got: &Instance) -> Error {
    let reason = match got.capability() {
        Some(capability) => format!("resolved instance is a {capability}"),
        None => "resolved instance offers no gRPC capability".to_string(),
    };
    Error::contract_mismatch(candidate.type_id(), candidate.capability(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrpcConfig;
    use crate::descriptor::prepare;
    use crate::discovery::{discover, Lifecycle, TypeMetadata, TypeRegistry};
    use crate::resolver::{BeanResolver, ResolveError};
    use bootkit::LaunchMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tonic::service::RoutesBuilder;
    use tonic::{Request, Status};

    struct FakeService(&'static str);

    impl GrpcService for FakeService {
        fn name(&self) -> &str {
            self.0
        }

        fn attach(&self, _routes: &mut RoutesBuilder) {}
    }

    fn pass(req: Request<()>) -> Result<Request<()>, Status> {
        Ok(req)
    }

    fn descriptor(types: TypeRegistry) -> ServerDescriptor {
        let config = GrpcConfig {
            launch_mode: LaunchMode::Test,
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        prepare(&config, &discover(&types).unwrap()).unwrap()
    }

    #[test]
    fn binds_services_and_interceptors() {
        let descriptor = descriptor(
            TypeRegistry::new()
                .service("app.Greeter")
                .interceptor("app.Pass"),
        );
        let resolver = BeanResolver::new()
            .register("app.Greeter", || Instance::service(FakeService("greeter.Greeter")))
            .register("app.Pass", || Instance::interceptor(pass));

        let bindings = bind(&descriptor, &resolver).unwrap();

        assert_eq!(bindings.services().len(), 1);
        assert_eq!(bindings.services()[0].name(), "greeter.Greeter");
        assert_eq!(bindings.interceptor_chain().len(), 1);
        for service in bindings.services() {
            assert!(descriptor.contains(service.candidate()));
        }
    }

    #[test]
    fn interceptor_order_follows_descriptor() {
        let descriptor = descriptor(
            TypeRegistry::new()
                .interceptor("i.A")
                .interceptor("i.B")
                .interceptor("i.C"),
        );
        let resolver = BeanResolver::new()
            .register("i.A", || Instance::interceptor(pass))
            .register("i.B", || Instance::interceptor(pass))
            .register("i.C", || Instance::interceptor(pass));

        let bindings = bind(&descriptor, &resolver).unwrap();

        let order: Vec<_> = bindings
            .interceptors()
            .iter()
            .map(|b| b.candidate().type_id())
            .collect();
        assert_eq!(order, ["i.A", "i.B", "i.C"]);
    }

    #[test]
    fn opaque_service_is_contract_mismatch() {
        let descriptor = descriptor(TypeRegistry::new().service("app.NotAService"));
        let resolver = BeanResolver::new().register("app.NotAService", || Instance::opaque(42));

        let err = bind(&descriptor, &resolver).unwrap_err();

        assert!(matches!(
            err,
            Error::ContractMismatch { ref type_id, expected: Capability::Service, .. }
                if type_id == "app.NotAService"
        ));
    }

    #[test]
    fn service_resolved_as_interceptor_is_contract_mismatch() {
        let descriptor = descriptor(TypeRegistry::new().interceptor("app.Greeter"));
        let resolver = BeanResolver::new()
            .register("app.Greeter", || Instance::service(FakeService("greeter.Greeter")));

        let err = bind(&descriptor, &resolver).unwrap_err();
        assert!(err.to_string().contains("resolved instance is a service"));
    }

    #[test]
    fn malformed_service_name_is_contract_mismatch() {
        let descriptor = descriptor(TypeRegistry::new().service("app.Broken"));
        let resolver =
            BeanResolver::new().register("app.Broken", || Instance::service(FakeService("")));

        assert!(matches!(
            bind(&descriptor, &resolver),
            Err(Error::ContractMismatch { .. })
        ));
    }

    #[test]
    fn duplicate_service_names_are_rejected() {
        let descriptor = descriptor(TypeRegistry::new().service("app.One").service("app.Two"));
        let resolver = BeanResolver::new()
            .register("app.One", || Instance::service(FakeService("greeter.Greeter")))
            .register("app.Two", || Instance::service(FakeService("greeter.Greeter")));

        let err = bind(&descriptor, &resolver).unwrap_err();
        assert_eq!(err.type_id(), Some("app.Two"));
    }

    #[cfg(feature = "health")]
    #[test]
    fn health_service_name_is_reserved() {
        let descriptor = descriptor(TypeRegistry::new().service("app.Health"));
        let resolver = BeanResolver::new().register("app.Health", || {
            Instance::service(FakeService("grpc.health.v1.Health"))
        });

        let err = bind(&descriptor, &resolver).unwrap_err();

        assert!(matches!(err, Error::ContractMismatch { .. }));
        assert_eq!(err.type_id(), Some("app.Health"));
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn declared_lifecycle_reaches_resolver() {
        struct Recording(std::sync::Mutex<Vec<(String, Lifecycle)>>);

        impl Resolver for Recording {
            fn resolve(
                &self,
                type_id: &str,
                lifecycle: Lifecycle,
            ) -> std::result::Result<Instance, ResolveError> {
                self.0.lock().unwrap().push((type_id.to_string(), lifecycle));
                Ok(Instance::interceptor(pass))
            }
        }

        let descriptor = descriptor(
            TypeRegistry::new()
                .register(TypeMetadata::new("i.Shared").interceptor().lifecycle(Lifecycle::Singleton))
                .interceptor("i.Fresh"),
        );
        let resolver = Recording(std::sync::Mutex::new(Vec::new()));

        bind(&descriptor, &resolver).unwrap();

        let mut seen = resolver.0.into_inner().unwrap();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            seen,
            [
                ("i.Fresh".to_string(), Lifecycle::Dependent),
                ("i.Shared".to_string(), Lifecycle::Singleton),
            ]
        );
    }

    #[test]
    fn singleton_candidate_binds_same_instance_across_starts() {
        let descriptor = descriptor(
            TypeRegistry::new()
                .register(TypeMetadata::new("app.Greeter").service().lifecycle(Lifecycle::Singleton)),
        );
        let resolver = BeanResolver::new()
            .register("app.Greeter", || Instance::service(FakeService("greeter.Greeter")));

        let first = bind(&descriptor, &resolver).unwrap();
        let second = bind(&descriptor, &resolver).unwrap();

        assert!(Arc::ptr_eq(
            first.services()[0].instance(),
            second.services()[0].instance()
        ));
    }

    #[test]
    fn unresolved_candidate_aborts_everything() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resolved);
        let descriptor = descriptor(
            TypeRegistry::new()
                .service("app.Greeter")
                .interceptor("app.Missing"),
        );
        let resolver = BeanResolver::new().register("app.Greeter", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Instance::service(FakeService("greeter.Greeter"))
        });

        let err = bind(&descriptor, &resolver).unwrap_err();

        assert!(matches!(
            err,
            Error::Bind(BindError::Unresolved {
                source: ResolveError::NotFound(_),
                ..
            })
        ));
        assert_eq!(err.type_id(), Some("app.Missing"));
        assert_eq!(resolved.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_descriptor_binds_nothing() {
        let descriptor = descriptor(TypeRegistry::new());
        let bindings = bind(&descriptor, &BeanResolver::new()).unwrap();
        assert!(bindings.services().is_empty());
        assert!(bindings.interceptor_chain().is_empty());
    }
}
