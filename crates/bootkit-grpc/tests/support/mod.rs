#![allow(dead_code)]

pub mod greeter;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bootkit_grpc::{GrpcConfig, Instance, LaunchMode, Request, Status};
use tonic::transport::Channel;

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn local_config(port: u16) -> GrpcConfig {
    GrpcConfig {
        launch_mode: LaunchMode::Test,
        host: "127.0.0.1".to_string(),
        port: port.into(),
        ..Default::default()
    }
}

pub async fn connect(addr: SocketAddr) -> Result<Channel, tonic::transport::Error> {
    Channel::from_shared(format!("http://{addr}"))
        .expect("valid uri")
        .connect()
        .await
}

pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Interceptor that appends `label` to `log` and lets the request through.
pub fn recording(label: &'static str, log: &CallLog) -> Instance {
    let log = Arc::clone(log);
    Instance::interceptor(move |req: Request<()>| -> Result<Request<()>, Status> {
        log.lock().unwrap().push(label);
        Ok(req)
    })
}

/// Interceptor that rejects every request without metadata key `key`.
pub fn require_metadata(key: &'static str) -> Instance {
    Instance::interceptor(move |req: Request<()>| -> Result<Request<()>, Status> {
        if req.metadata().contains_key(key) {
            Ok(req)
        } else {
            Err(Status::unauthenticated(format!("missing {key}")))
        }
    })
}
