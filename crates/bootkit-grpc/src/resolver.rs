//! Boundary to the dependency container that owns service instances.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::discovery::{Capability, Lifecycle};
use crate::interceptor::GrpcInterceptor;
use crate::service::GrpcService;

/// A live instance handed out by the container.
///
/// The container keeps ownership; the server only holds shared handles.
#[derive(Clone)]
pub enum Instance {
    Service(Arc<dyn GrpcService>),
    Interceptor(Arc<dyn GrpcInterceptor>),
    /// Something that offers neither capability.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Instance {
    pub fn service(service: impl GrpcService) -> Self {
        Self::Service(Arc::new(service))
    }

    pub fn interceptor(interceptor: impl GrpcInterceptor) -> Self {
        Self::Interceptor(Arc::new(interceptor))
    }

    pub fn opaque(value: impl Any + Send + Sync) -> Self {
        Self::Opaque(Arc::new(value))
    }

    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Service(_) => Some(Capability::Service),
            Self::Interceptor(_) => Some(Capability::Interceptor),
            Self::Opaque(_) => None,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(svc) => f.debug_tuple("Service").field(&svc.name()).finish(),
            Self::Interceptor(_) => f.write_str("Interceptor"),
            Self::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

/// Resolution failures reported by the container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no bean is registered for `{0}`")]
    NotFound(String),

    #[error("`{type_id}` matches {count} beans")]
    Ambiguous { type_id: String, count: usize },
}

/// Lookup capability of the external container.
///
/// `lifecycle` is the qualifier the type's metadata declared; the container
/// decides what sharing it implies.
pub trait Resolver: Send + Sync {
    fn resolve(&self, type_id: &str, lifecycle: Lifecycle) -> Result<Instance, ResolveError>;
}

impl<R> Resolver for Arc<R>
where
    R: Resolver + ?Sized,
{
    fn resolve(&self, type_id: &str, lifecycle: Lifecycle) -> Result<Instance, ResolveError> {
        (**self).resolve(type_id, lifecycle)
    }
}

type Factory = Box<dyn Fn() -> Instance + Send + Sync>;

struct Bean {
    factory: Factory,
    shared: OnceLock<Instance>,
}

impl Bean {
    fn instance(&self, lifecycle: Lifecycle) -> Instance {
        match lifecycle {
            Lifecycle::Dependent => (self.factory)(),
            Lifecycle::Singleton => self.shared.get_or_init(|| (self.factory)()).clone(),
        }
    }
}

/// Map-backed resolver.
///
/// Dependent resolutions run the factory every time. A singleton resolution
/// runs it once and hands out that instance from then on. Registering the
/// same type twice makes it ambiguous.
#[derive(Default)]
pub struct BeanResolver {
    beans: HashMap<String, Vec<Bean>>,
}

impl BeanResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `type_id`.
    pub fn register<F>(mut self, type_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Instance + Send + Sync + 'static,
    {
        self.insert(type_id, factory);
        self
    }

    /// Register one shared instance for `type_id`.
    pub fn singleton(self, type_id: impl Into<String>, instance: Instance) -> Self {
        self.register(type_id, move || instance.clone())
    }

    pub fn insert<F>(&mut self, type_id: impl Into<String>, factory: F)
    where
        F: Fn() -> Instance + Send + Sync + 'static,
    {
        self.beans
            .entry(type_id.into())
            .or_default()
            .push(Bean {
                factory: Box::new(factory),
                shared: OnceLock::new(),
            });
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.beans.contains_key(type_id)
    }
}

impl Resolver for BeanResolver {
    fn resolve(&self, type_id: &str, lifecycle: Lifecycle) -> Result<Instance, ResolveError> {
        match self.beans.get(type_id).map(Vec::as_slice) {
            None | Some([]) => Err(ResolveError::NotFound(type_id.to_string())),
            Some([bean]) => Ok(bean.instance(lifecycle)),
            Some(many) => Err(ResolveError::Ambiguous {
                type_id: type_id.to_string(),
                count: many.len(),
            }),
        }
    }
}

impl fmt::Debug for BeanResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanResolver")
            .field("beans", &self.beans.keys().collect::<Vec<_>>())
            .finish()
    }
}
