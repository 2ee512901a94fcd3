//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use dispatch_gateway::accounts::AccountStore;
use dispatch_gateway::config::GatewayConfig;
use dispatch_gateway::dispatch::MethodRegistry;
use dispatch_gateway::http::{AppState, HttpServer, ServeError};
use dispatch_gateway::lifecycle::Shutdown;
use dispatch_gateway::net::GracefulListener;
use dispatch_gateway::observability::logging::RequestLog;

/// Request targets (`path?query`) seen by a mock upstream.
pub type Seen = Arc<Mutex<Vec<String>>>;

/// Start a programmable mock upstream. `respond` maps the request target to
/// a status and body.
pub async fn start_mock_upstream<F>(respond: F) -> (SocketAddr, Seen)
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::default();
    let respond = Arc::new(respond);

    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let respond = Arc::clone(&respond);
                    let log = Arc::clone(&log);
                    tokio::spawn(async move {
                        let _ = serve_one(socket, &*respond, &log).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, seen)
}

async fn serve_one<F>(mut socket: TcpStream, respond: &F, seen: &Seen) -> std::io::Result<()>
where
    F: Fn(&str) -> (u16, String),
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    seen.lock().push(target.clone());

    let (status, body) = respond(&target);
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// A gateway serving on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ServeError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve `registry` for `accounts` with the given drain deadline.
pub async fn spawn_gateway(
    config: GatewayConfig,
    registry: MethodRegistry,
    accounts: AccountStore,
    max_wait: Duration,
) -> TestGateway {
    dispatch_gateway::http::install_panic_hook();

    let server = HttpServer::with_parts(&config, registry, accounts, RequestLog::disabled());
    let state = server.state().clone();
    let listener = GracefulListener::bind("127.0.0.1:0", max_wait).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, stop));

    TestGateway {
        addr,
        state,
        shutdown,
        handle,
    }
}

/// Post a form to `/call` and return the status and body.
pub async fn post_call(gateway: &TestGateway, form: &[(&str, &str)]) -> (u16, String) {
    let response = reqwest::Client::new()
        .post(gateway.url("/call"))
        .form(form)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}
