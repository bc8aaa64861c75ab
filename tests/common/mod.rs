//! In-process mock of a LibreSpeed-compatible backend
//!
//! A tiny HTTP/1.1 server on a loopback port, enough to exercise liveness
//! checks, HTTP latency probes, transfer windows, and telemetry submission
//! without touching the network. Connections are handled keep-alive style
//! because the client reuses them across requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use speedprobe::servers::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Tunable behavior of one mock backend instance
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Added before answering a ping request
    pub ping_delay: Duration,
    /// Body returned by the ping path; non-empty marks the backend unhealthy
    pub ping_body: &'static str,
    /// Status returned by the ping path
    pub ping_status: u16,
    /// Added before serving a download body
    pub download_delay: Duration,
    /// Bytes served per download request
    pub download_body_len: usize,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            ping_delay: Duration::ZERO,
            ping_body: "",
            ping_status: 200,
            download_delay: Duration::ZERO,
            download_body_len: 64 * 1024,
        }
    }
}

/// Counters observed by tests
#[derive(Debug, Default)]
pub struct MockCounters {
    pub ping_hits: AtomicUsize,
    pub download_hits: AtomicUsize,
    pub upload_hits: AtomicUsize,
    pub telemetry_hits: AtomicUsize,
    pub uploaded_bytes: AtomicU64,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub counters: Arc<MockCounters>,
}

impl MockBackend {
    pub async fn spawn(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(MockCounters::default());

        let loop_counters = Arc::clone(&counters);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let behavior = behavior.clone();
                let counters = Arc::clone(&loop_counters);
                tokio::spawn(handle_connection(stream, behavior, counters));
            }
        });

        Self { addr, counters }
    }

    /// A server record pointing at this backend
    pub fn server(&self, id: i32, name: &str) -> Server {
        Server {
            id,
            name: name.to_string(),
            base_url: format!("http://{}", self.addr),
            download_path: "download".to_string(),
            upload_path: "upload".to_string(),
            ping_path: "ping".to_string(),
            get_ip_path: "getip".to_string(),
            sponsor_name: String::new(),
            sponsor_url: String::new(),
            no_icmp: Arc::default(),
        }
    }
}

/// A server record pointing at a loopback port nobody listens on
pub async fn unreachable_server(id: i32, name: &str) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    Server {
        id,
        name: name.to_string(),
        base_url: format!("http://{addr}"),
        download_path: "download".to_string(),
        upload_path: "upload".to_string(),
        ping_path: "ping".to_string(),
        get_ip_path: "getip".to_string(),
        sponsor_name: String::new(),
        sponsor_url: String::new(),
        no_icmp: Arc::default(),
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    behavior: MockBehavior,
    counters: Arc<MockCounters>,
) {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let Some(header_end) = read_until(&mut stream, &mut buf, b"\r\n\r\n").await else {
            return;
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        buf.drain(..header_end);

        let request_line = head.lines().next().unwrap_or_default().to_string();
        let lower = head.to_ascii_lowercase();
        let chunked = lower.contains("transfer-encoding: chunked");
        let content_length = lower
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        // consume the request body before answering
        let body_bytes = if chunked {
            match read_chunked_body(&mut stream, &mut buf).await {
                Some(n) => n,
                None => return,
            }
        } else {
            if !read_exact_body(&mut stream, &mut buf, content_length).await {
                return;
            }
            content_length as u64
        };

        let ok = route(&mut stream, &request_line, body_bytes, &behavior, &counters).await;
        if !ok {
            return;
        }
    }
}

async fn route(
    stream: &mut TcpStream,
    request_line: &str,
    body_bytes: u64,
    behavior: &MockBehavior,
    counters: &MockCounters,
) -> bool {
    let path = request_line.split_whitespace().nth(1).unwrap_or("");

    if path.starts_with("/ping") {
        counters.ping_hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(behavior.ping_delay).await;
        return respond(
            stream,
            behavior.ping_status,
            behavior.ping_body.as_bytes(),
        )
        .await;
    }

    if path.starts_with("/download") {
        counters.download_hits.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(behavior.download_delay).await;
        let body = vec![0u8; behavior.download_body_len];
        let ok = respond(stream, 200, &body).await;

        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        return ok;
    }

    if path.starts_with("/upload") {
        counters.upload_hits.fetch_add(1, Ordering::SeqCst);
        counters.uploaded_bytes.fetch_add(body_bytes, Ordering::SeqCst);
        return respond(stream, 200, b"").await;
    }

    if path.starts_with("/telemetry") {
        counters.telemetry_hits.fetch_add(1, Ordering::SeqCst);
        return respond(stream, 200, b"id 42").await;
    }

    respond(stream, 404, b"not found").await
}

async fn respond(stream: &mut TcpStream, status: u16, body: &[u8]) -> bool {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n",
        body.len()
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return false;
    }
    stream.write_all(body).await.is_ok()
}

/// Reads from the stream until `pattern` appears in `buf`; returns the index
/// one past the pattern, or `None` on EOF/error
async fn read_until(stream: &mut TcpStream, buf: &mut Vec<u8>, pattern: &[u8]) -> Option<usize> {
    loop {
        if let Some(pos) = find(buf, pattern) {
            return Some(pos + pattern.len());
        }
        let mut chunk = [0u8; 16 * 1024];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn read_exact_body(stream: &mut TcpStream, buf: &mut Vec<u8>, len: usize) -> bool {
    while buf.len() < len {
        let mut chunk = [0u8; 16 * 1024];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    buf.drain(..len);
    true
}

/// Consumes one chunked transfer-coded body, returning the decoded byte count
async fn read_chunked_body(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<u64> {
    let mut total = 0u64;
    loop {
        let line_end = read_until(stream, buf, b"\r\n").await?;
        let size_line = String::from_utf8_lossy(&buf[..line_end - 2]).to_string();
        buf.drain(..line_end);
        let size = usize::from_str_radix(size_line.trim(), 16).ok()?;

        if size == 0 {
            // trailing CRLF after the last chunk
            if !read_exact_body(stream, buf, 2).await {
                return None;
            }
            return Some(total);
        }

        if !read_exact_body(stream, buf, size + 2).await {
            return None;
        }
        total += size as u64;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
