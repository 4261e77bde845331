//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use batch_proxy::config::BatchConfig;
use batch_proxy::http::HttpServer;
use batch_proxy::lifecycle::Shutdown;
use batch_proxy::observability::NoopSink;
use batch_proxy::transport::ReqwestTransport;

pub const BATCH_CONTENT_TYPE: &str = r#"multipart/batch; type="application/http"; boundary=batch"#;

/// What the mock backend saw.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: String,
    pub target: String,
    pub body: String,
}

/// Start a backend that answers every request with `200` and
/// `"<METHOD> <target> <body>"`.
pub async fn start_echo_backend(addr: SocketAddr) {
    start_programmable_backend(addr, |received| async move {
        (200, format!("{} {} {}", received.method, received.target, received.body))
    })
    .await;
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(Received) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(received) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(received).await;
                        let status_text = match status {
                            200 => "200 OK",
                            201 => "201 Created",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_request(socket: &mut TcpStream) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(head_end + content_length);
    let body = String::from_utf8_lossy(&buf[head_end..body_end]).into_owned();

    Some(Received { method, target, body })
}

/// Start the batch proxy on `addr` with a real reqwest transport.
pub async fn start_proxy(addr: SocketAddr, mut config: BatchConfig) -> Shutdown {
    config.listener.bind_address = addr.to_string();
    config.observability.metrics_enabled = false;

    let transport = Arc::new(ReqwestTransport::from_config(&config.timeouts).unwrap());
    let server = HttpServer::new(config, transport, Arc::new(NoopSink));
    let listener = TcpListener::bind(addr).await.unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

/// One `application/http` part addressed at `host`.
pub fn part(content_id: &str, method: &str, host: SocketAddr, target: &str, body: &str) -> String {
    let length = if body.is_empty() {
        String::new()
    } else {
        format!("Content-Length: {}\r\n", body.len())
    };
    format!(
        "--batch\r\nContent-Type: application/http\r\nContent-ID: {content_id}\r\n\r\n\
         {method} {target} HTTP/1.1\r\nHost: {host}\r\n{length}\r\n{body}\r\n"
    )
}

pub fn envelope(parts: &[String]) -> String {
    let mut body = parts.concat();
    body.push_str("--batch--\r\n");
    body
}
