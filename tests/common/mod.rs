//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;

use axum::Router;
use dice_server::config::{ListenerConfig, ServiceConfig, TelemetryConfig};
use dice_server::http::{HttpServer, ServerError};
use dice_server::lifecycle::RunContext;
use dice_server::net::Listener;
use dice_server::observability::exporters::BoxError;
use dice_server::observability::{ExporterFactory, Telemetry};
use opentelemetry::KeyValue;
use opentelemetry::Value;
use opentelemetry_sdk::logs::InMemoryLogExporter;
use opentelemetry_sdk::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SpanData};
use tokio::task::JoinHandle;

/// In-memory exporters whose contents tests can inspect.
#[derive(Clone, Default)]
pub struct InMemoryExporters {
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
    pub logs: InMemoryLogExporter,
}

impl ExporterFactory for InMemoryExporters {
    type Spans = InMemorySpanExporter;
    type Metrics = InMemoryMetricExporter;
    type Logs = InMemoryLogExporter;

    fn spans(&self) -> Result<Self::Spans, BoxError> {
        Ok(self.spans.clone())
    }

    fn metrics(&self) -> Result<Self::Metrics, BoxError> {
        Ok(self.metrics.clone())
    }

    fn logs(&self) -> Result<Self::Logs, BoxError> {
        Ok(self.logs.clone())
    }
}

impl InMemoryExporters {
    /// Spans exported so far. Call `Telemetry::force_flush` first.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap()
    }
}

/// Telemetry bundle exporting into memory.
pub fn telemetry() -> (Telemetry, InMemoryExporters) {
    let exporters = InMemoryExporters::default();
    let telemetry = Telemetry::setup_with(
        &RunContext::new(),
        &TelemetryConfig::default(),
        exporters.clone(),
    )
    .unwrap_or_else(|e| panic!("telemetry setup failed: {e}"));
    (telemetry, exporters)
}

/// An address nothing is listening on right now.
pub fn free_addr() -> SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Default config listening on `addr`.
pub fn config_for(addr: SocketAddr) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener = ListenerConfig {
        bind_address: addr.to_string(),
        max_connections: 64,
    };
    config
}

/// A server running on an ephemeral port.
pub struct Running {
    pub addr: SocketAddr,
    pub ctx: RunContext,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop the run context and wait for the server to return.
    pub async fn stop(self, within: Duration) -> Result<(), ServerError> {
        self.ctx.stop();
        tokio::time::timeout(within, self.handle)
            .await
            .expect("server did not stop in time")
            .unwrap()
    }
}

/// Serve `router` with `config`'s timeouts on an ephemeral port.
pub async fn start(mut config: ServiceConfig, router: Router) -> Running {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let ctx = RunContext::new();
    let server = HttpServer::new(&config, router);
    let handle = tokio::spawn(server.serve(listener, ctx.clone()));

    Running { addr, ctx, handle }
}

/// Wait until something accepts connections on `addr`.
pub async fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {addr}");
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Value of the attribute `key` on `span`.
pub fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    attribute_in(&span.attributes, key)
}

pub fn attribute_in(attributes: &[KeyValue], key: &str) -> Option<Value> {
    attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}
