//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use session_relay::{RelayConfig, RelayService, Shutdown};

/// Serve `router` on an ephemeral port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Upstream that answers every request with a JSON description of what
/// it received. `/slow` waits `delay` first.
pub async fn start_echo_backend(name: &'static str, delay: Duration) -> SocketAddr {
    let router = Router::new()
        .route(
            "/slow",
            get(move |State(name): State<&'static str>, request: Request<Body>| async move {
                tokio::time::sleep(delay).await;
                echo(name, request)
            }),
        )
        .fallback(|State(name): State<&'static str>, request: Request<Body>| async move {
            echo(name, request)
        })
        .with_state(name);
    spawn_router(router).await
}

fn echo(name: &str, request: Request<Body>) -> Json<Value> {
    let header = |key: &str| {
        request
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "upstream": name,
        "method": request.method().as_str(),
        "uri": request.uri().to_string(),
        "host": header("host"),
        "x_forwarded_for": header("x-forwarded-for"),
        "x_forwarded_proto": header("x-forwarded-proto"),
        "x_forwarded_host": header("x-forwarded-host"),
        "x_request_id": header("x-request-id"),
        "x_hop": header("x-hop"),
    }))
}

/// Raw TCP upstream returning a fixed body and closing every connection.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Relay config with fast timers for tests.
pub fn test_config(targets: &[SocketAddr], data_dir: &Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.targets = targets.iter().map(|a| format!("http://{a}")).collect();
    config.store.data_dir = data_dir.to_path_buf();
    config.retries.max_attempts = 2;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 20;
    config.timeouts.connect_secs = 1;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    config
}

pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait until sessions are flushed.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

pub async fn start_relay(config: RelayConfig) -> RunningRelay {
    let service = RelayService::bootstrap(config).await.unwrap();
    let listener = service.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(service.serve(listener, shutdown.clone()));
    RunningRelay {
        addr,
        shutdown,
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `/health` until it reports `state`, or panic after `within`.
pub async fn wait_for_health(relay: &RunningRelay, state: &str, within: Duration) -> Value {
    let client = client();
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if let Ok(res) = client.get(relay.url("/health")).send().await {
            if let Ok(body) = res.json::<Value>().await {
                if body["state"] == state {
                    return body;
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "health never reached {state}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn read_sessions(data_dir: &Path) -> Value {
    let raw = std::fs::read_to_string(data_dir.join("sessions.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}
