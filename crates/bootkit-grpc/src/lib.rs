//! # bootkit-grpc
//!
//! Phased bootstrap for a tonic gRPC server embedded in a host application.
//!
//! The host describes its types through a [`MetadataSource`], owns instances
//! behind a [`Resolver`] and runs cleanup through a [`ShutdownRegistrar`].
//! [`Bootstrap`] drives the server through
//! `Uninitialized -> Prepared -> Started -> Stopped`:
//!
//! 1. **build** scans type metadata for service and interceptor markers.
//! 2. **prepare** freezes configuration and candidates into a
//!    [`ServerDescriptor`]. No socket is opened.
//! 3. **start** resolves every candidate, binds the port, attaches services
//!    behind the ordered interceptor chain and registers a stop callback.
//! 4. **stop** releases the port. It runs at most once.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bootkit_grpc::{BeanResolver, Bootstrap, GrpcConfig, Instance, ShutdownHooks, TonicService, TypeRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     bootkit_grpc::init_logging_from_env();
//!     let config = GrpcConfig::builder().with_dotenv().build::<GrpcConfig>()?;
//!
//!     let types = TypeRegistry::new().service("app.Greeter");
//!     let resolver = BeanResolver::new().register("app.Greeter", || {
//!         Instance::service(TonicService::new(GreeterServer::new(MyGreeter)))
//!     });
//!     let hooks = Arc::new(ShutdownHooks::new());
//!
//!     let bootstrap = Bootstrap::new(types, resolver, hooks.clone());
//!     bootstrap.prepare(&config).await?;
//!     bootstrap.start().await?;
//!
//!     hooks.run_on_signal().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization (default)
//! - `health` - Serve `grpc.health.v1.Health` next to bound services (default)
//! - `tls` - Enable TLS support
//! - `full` - Enable all features

pub mod bootstrap;
pub mod config;
pub mod descriptor;
pub mod discovery;
mod error;
pub mod interceptor;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod shutdown;

#[cfg(feature = "health")]
pub mod health;

pub use bootstrap::{Bootstrap, Phase};
pub use config::{ConfigBuilder, ConfigError, GrpcConfig, DEFAULT_PORT};
pub use descriptor::{ServerDescriptor, TlsSource, Transport};
pub use discovery::{
    discover, CandidateSet, Capability, Lifecycle, Markers, MetadataSource, ServiceCandidate,
    TypeMetadata, TypeRegistry,
};
pub use error::{BindError, ConfigurationError, Error, Result};
pub use interceptor::{GrpcInterceptor, InterceptorChain};
pub use lifecycle::ServerHandle;
pub use registry::{Bindings, BoundInterceptor, BoundService};
pub use resolver::{BeanResolver, Instance, ResolveError, Resolver};
pub use service::{GrpcService, TonicService};
pub use shutdown::{shutdown_signal, ShutdownCallback, ShutdownFuture, ShutdownHooks, ShutdownRegistrar};

#[cfg(feature = "health")]
pub use health::{HealthReporter, ServingStatus};

pub use bootkit::{LaunchMode, LogFormat};
pub use tonic::{Code, Request, Response, Status};

#[cfg(feature = "tracing")]
pub use bootkit::{init_logging, init_logging_for, init_logging_from_env};
