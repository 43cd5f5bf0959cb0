// In-process HTTP server used by transfer and queue tests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Failure injected into the next response for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Respond with this status code and no body
    Status(u16),
    /// Announce the full length but close the connection halfway through the body
    Truncate,
    /// Send half of the body, then stop sending without closing
    Stall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub range_start: Option<u64>,
}

#[derive(Default)]
struct ServerState {
    files: HashMap<String, Vec<u8>>,
    faults: HashMap<String, Vec<Fault>>,
    requests: Vec<RecordedRequest>,
    ignore_ranges: bool,
}

pub struct TestServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = shared.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn add_file(&self, path: &str, body: Vec<u8>) {
        self.state.lock().unwrap().files.insert(path.to_string(), body);
    }

    /// Inject `fault` into the next `times` responses for `path`
    pub fn fail_next(&self, path: &str, fault: Fault, times: usize) {
        let mut state = self.state.lock().unwrap();
        let queue = state.faults.entry(path.to_string()).or_default();
        queue.extend(std::iter::repeat_n(fault, times));
    }

    /// Answer range requests with the full body and a 200 status
    pub fn ignore_ranges(&self) {
        self.state.lock().unwrap().ignore_ranges = true;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<Mutex<ServerState>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buffer).to_string();
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let range_start = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, value)| value.trim().strip_prefix("bytes="))
        .and_then(|value| value.trim_end_matches('-').parse::<u64>().ok());

    let (body, fault, ignore_ranges) = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            path: path.clone(),
            range_start,
        });
        let fault = state
            .faults
            .get_mut(&path)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));
        (state.files.get(&path).cloned(), fault, state.ignore_ranges)
    };

    let Some(body) = body else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return stream.shutdown().await;
    };

    if let Some(Fault::Status(code)) = fault {
        let response = format!(
            "HTTP/1.1 {} Injected\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            code
        );
        stream.write_all(response.as_bytes()).await?;
        return stream.shutdown().await;
    }

    let (status, payload, content_range) = match range_start {
        Some(start) if !ignore_ranges && (start as usize) < body.len() => (
            "206 Partial Content",
            body[start as usize..].to_vec(),
            Some(format!("bytes {}-{}/{}", start, body.len() - 1, body.len())),
        ),
        _ => ("200 OK", body, None),
    };

    let mut header = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n",
        status,
        payload.len()
    );
    if let Some(range) = content_range {
        header.push_str(&format!("Content-Range: {}\r\n", range));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes()).await?;

    match fault {
        Some(Fault::Truncate) => {
            stream.write_all(&payload[..payload.len() / 2]).await?;
            stream.flush().await?;
            Ok(())
        }
        Some(Fault::Stall) => {
            stream.write_all(&payload[..payload.len() / 2]).await?;
            stream.flush().await?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        _ => {
            stream.write_all(&payload).await?;
            stream.shutdown().await
        }
    }
}
