//! Health reporting for bound services.
//!
//! Serves the standard `grpc.health.v1.Health` protocol next to the bound
//! services. The empty service name stands for the whole server.

pub use tonic_health::server::HealthReporter;
pub use tonic_health::ServingStatus;

/// Route served by the built-in health service; no bound service may claim it.
pub const HEALTH_SERVICE_NAME: &str = "grpc.health.v1.Health";

/// Create a health service and reporter.
pub fn health_service() -> (
    HealthReporter,
    tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
) {
    tonic_health::server::health_reporter()
}

/// Set `status` for every name in `services` and for the server as a whole.
pub async fn report<'a>(
    reporter: &mut HealthReporter,
    services: impl IntoIterator<Item = &'a str>,
    status: ServingStatus,
) {
    for name in services {
        reporter.set_service_status(name, status).await;
    }
    reporter.set_service_status("", status).await;
}
