//! Discovery of gRPC service and interceptor types.
//!
//! Types are declared up front in a [`MetadataSource`] (usually a
//! [`TypeRegistry`]) together with the markers they carry. [`discover`] turns
//! that list into a [`CandidateSet`] without instantiating anything.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Role a discovered type plays in the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Service,
    Interceptor,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Service => "service",
            Self::Interceptor => "interceptor",
        })
    }
}

/// Lifecycle qualifier passed to [`Resolver::resolve`](crate::Resolver::resolve)
/// along with the type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// A fresh instance per resolution.
    #[default]
    Dependent,
    /// One shared instance owned by the container.
    Singleton,
}

/// Marker capabilities a type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Markers {
    pub service: bool,
    pub interceptor: bool,
}

impl Markers {
    pub const NONE: Self = Self {
        service: false,
        interceptor: false,
    };
    pub const SERVICE: Self = Self {
        service: true,
        interceptor: false,
    };
    pub const INTERCEPTOR: Self = Self {
        service: false,
        interceptor: true,
    };

    fn union(self, other: Self) -> Self {
        Self {
            service: self.service || other.service,
            interceptor: self.interceptor || other.interceptor,
        }
    }
}

/// Read-only metadata describing one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMetadata {
    type_id: String,
    markers: Markers,
    lifecycle: Option<Lifecycle>,
    priority: Option<i32>,
}

impl TypeMetadata {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            markers: Markers::NONE,
            lifecycle: None,
            priority: None,
        }
    }

    /// Carry the service marker.
    pub fn service(mut self) -> Self {
        self.markers.service = true;
        self
    }

    /// Carry the interceptor marker.
    pub fn interceptor(mut self) -> Self {
        self.markers.interceptor = true;
        self
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Interceptor ordering key; lower runs first (outermost).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn markers(&self) -> Markers {
        self.markers
    }
}

/// Substrate queried by [`discover`]. Never mutated by this crate.
pub trait MetadataSource {
    fn types(&self) -> Vec<TypeMetadata>;
}

impl MetadataSource for Vec<TypeMetadata> {
    fn types(&self) -> Vec<TypeMetadata> {
        self.clone()
    }
}

/// Explicit registration list of application types.
///
/// # Example
///
/// ```ignore
/// let types = TypeRegistry::new()
///     .service("greeter.Greeter")
///     .interceptor("app.AuthInterceptor")
///     .register(TypeMetadata::new("app.Audit").interceptor().priority(-10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<TypeMetadata>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, metadata: TypeMetadata) -> Self {
        self.types.push(metadata);
        self
    }

    pub fn service(self, type_id: impl Into<String>) -> Self {
        self.register(TypeMetadata::new(type_id).service())
    }

    pub fn interceptor(self, type_id: impl Into<String>) -> Self {
        self.register(TypeMetadata::new(type_id).interceptor())
    }

    pub fn push(&mut self, metadata: TypeMetadata) {
        self.types.push(metadata);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetadataSource for TypeRegistry {
    fn types(&self) -> Vec<TypeMetadata> {
        self.types.clone()
    }
}

/// A discovered type believed to implement a service or an interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCandidate {
    type_id: String,
    capability: Capability,
    lifecycle: Lifecycle,
    priority: i32,
}

impl ServiceCandidate {
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Candidates in first-registration order, unique per type identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: Vec<ServiceCandidate>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceCandidate> {
        self.candidates.iter()
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceCandidate> {
        self.by_capability(Capability::Service)
    }

    pub fn interceptors(&self) -> impl Iterator<Item = &ServiceCandidate> {
        self.by_capability(Capability::Interceptor)
    }

    pub fn get(&self, type_id: &str) -> Option<&ServiceCandidate> {
        self.candidates.iter().find(|c| c.type_id == type_id)
    }

    fn by_capability(&self, capability: Capability) -> impl Iterator<Item = &ServiceCandidate> {
        self.candidates
            .iter()
            .filter(move |c| c.capability == capability)
    }
}

/// Classify every type of `source` by its markers.
///
/// Entries sharing a type identifier are merged first: markers are unioned and
/// the first explicit lifecycle/priority wins.
pub fn discover<S>(source: &S) -> Result<CandidateSet>
where
    S: MetadataSource + ?Sized,
{
    let mut merged: Vec<TypeMetadata> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for meta in source.types() {
        match index.get(&meta.type_id) {
            Some(&i) => {
                let existing = &mut merged[i];
                existing.markers = existing.markers.union(meta.markers);
                existing.lifecycle = existing.lifecycle.or(meta.lifecycle);
                existing.priority = existing.priority.or(meta.priority);
            }
            None => {
                index.insert(meta.type_id.clone(), merged.len());
                merged.push(meta);
            }
        }
    }

    let mut candidates = Vec::with_capacity(merged.len());
    for meta in merged {
        let capability = match (meta.markers.service, meta.markers.interceptor) {
            (true, true) => {
                return Err(Error::AmbiguousRole {
                    type_id: meta.type_id,
                })
            }
            (true, false) => Capability::Service,
            (false, true) => Capability::Interceptor,
            (false, false) => continue,
        };

        candidates.push(ServiceCandidate {
            type_id: meta.type_id,
            capability,
            lifecycle: meta.lifecycle.unwrap_or_default(),
            priority: meta.priority.unwrap_or(0),
        });
    }

    let set = CandidateSet { candidates };
    tracing::debug!(
        services = set.services().count(),
        interceptors = set.interceptors().count(),
        "gRPC candidates discovered"
    );
    Ok(set)
}
