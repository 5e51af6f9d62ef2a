//! gRPC Greeter Server Example
//!
//! Run with:
//! ```bash
//! GRPC_PORT=50051 cargo run -p bootkit-grpc --example greeter_server
//! ```
//!
//! Test with grpcurl:
//! ```bash
//! # Call SayHello (the request needs the x-tenant header)
//! grpcurl -plaintext -H 'x-tenant: acme' -d '{"name": "World"}' \
//!   -proto greeter.proto localhost:50051 greeter.Greeter/SayHello
//!
//! # Check health
//! grpcurl -plaintext localhost:50051 grpc.health.v1.Health/Check
//! ```

use std::sync::Arc;

use bootkit_grpc::{
    init_logging_from_env, BeanResolver, Bootstrap, GrpcConfig, Instance, Request, ShutdownHooks,
    Status, TonicService, TypeMetadata, TypeRegistry,
};

#[allow(dead_code)]
#[path = "../tests/support/greeter.rs"]
mod greeter;

use greeter::GreeterServer;

fn log_request(req: Request<()>) -> Result<Request<()>, Status> {
    tracing::info!(metadata = ?req.metadata(), "incoming gRPC request");
    Ok(req)
}

fn require_tenant(req: Request<()>) -> Result<Request<()>, Status> {
    match req.metadata().get("x-tenant") {
        Some(_) => Ok(req),
        None => Err(Status::unauthenticated("missing x-tenant header")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env();

    let config: GrpcConfig = GrpcConfig::builder().with_dotenv().build()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        launch_mode = %config.launch_mode,
        "Starting gRPC server"
    );

    let types = TypeRegistry::new()
        .service("example.Greeter")
        .register(TypeMetadata::new("example.Logging").interceptor().priority(-1))
        .interceptor("example.Tenant");

    let resolver = BeanResolver::new()
        .register("example.Greeter", || {
            Instance::service(TonicService::new(GreeterServer))
        })
        .singleton("example.Logging", Instance::interceptor(log_request))
        .singleton("example.Tenant", Instance::interceptor(require_tenant));

    let hooks = Arc::new(ShutdownHooks::new());
    let bootstrap = Bootstrap::new(types, resolver, hooks.clone());

    bootstrap.prepare(&config).await?;
    let server = bootstrap.start().await?;
    tracing::info!(addr = %server.local_addr(), "Greeter ready");

    hooks.run_on_signal().await;
    bootstrap.stop().await?;

    Ok(())
}
