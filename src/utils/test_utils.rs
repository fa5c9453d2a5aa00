//! Test doubles for the completion endpoint: a scripted in-process endpoint
//! for state machine tests and a bare-bones HTTP server for exercising the
//! real `reqwest` client.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::api::{ByteStream, ChatRequest, CompletionEndpoint, RequestError};
use crate::core::stream_decoder::StreamReadFailure;

// ============================================================================
// Scripted endpoint
// ============================================================================

#[derive(Debug, Clone)]
pub enum StreamStep {
    Chunk { bytes: Vec<u8>, delay: Duration },
    Fail(String),
}

#[derive(Debug, Clone)]
pub enum Script {
    Stream {
        open_delay: Duration,
        steps: Vec<StreamStep>,
    },
    Reject(u16),
    Transport(String),
    /// Never answers. Records when the pending request is dropped.
    Hang,
}

impl Script {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self::paced(fragments, Duration::ZERO)
    }

    pub fn paced(fragments: &[&str], delay: Duration) -> Self {
        Script::Stream {
            open_delay: Duration::ZERO,
            steps: fragments
                .iter()
                .map(|f| StreamStep::Chunk {
                    bytes: f.as_bytes().to_vec(),
                    delay,
                })
                .collect(),
        }
    }

    pub fn failing_after(fragments: &[&str], reason: &str) -> Self {
        let mut steps: Vec<StreamStep> = fragments
            .iter()
            .map(|f| StreamStep::Chunk {
                bytes: f.as_bytes().to_vec(),
                delay: Duration::ZERO,
            })
            .collect();
        steps.push(StreamStep::Fail(reason.to_string()));
        Script::Stream {
            open_delay: Duration::ZERO,
            steps,
        }
    }

    pub fn delayed(delay: Duration, fragments: &[&str]) -> Self {
        match Self::fragments(fragments) {
            Script::Stream { steps, .. } => Script::Stream {
                open_delay: delay,
                steps,
            },
            other => other,
        }
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Endpoint that replays one [`Script`] per request, in order, and records
/// every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedEndpoint {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    hang_dropped: Arc<AtomicBool>,
}

impl ScriptedEndpoint {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// True once a request answered with [`Script::Hang`] has been abandoned.
    pub fn hang_was_dropped(&self) -> bool {
        self.hang_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CompletionEndpoint for ScriptedEndpoint {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, RequestError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .expect("no script left for request");

        match script {
            Script::Reject(status) => Err(RequestError::Rejected { status }),
            Script::Transport(reason) => Err(RequestError::Transport(reason)),
            Script::Hang => {
                let _flag = DropFlag(Arc::clone(&self.hang_dropped));
                futures_util::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
            Script::Stream { open_delay, steps } => {
                if !open_delay.is_zero() {
                    tokio::time::sleep(open_delay).await;
                }
                let body = stream::unfold(steps.into_iter(), |mut steps| async move {
                    match steps.next()? {
                        StreamStep::Chunk { bytes, delay } => {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            Some((Ok(bytes), steps))
                        }
                        StreamStep::Fail(reason) => {
                            Some((Err(StreamReadFailure::new(reason)), steps))
                        }
                    }
                });
                Ok(Box::pin(body) as ByteStream)
            }
        }
    }
}

// ============================================================================
// Mock HTTP server
// ============================================================================

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> ChatRequest {
        serde_json::from_slice(&self.body).expect("request body should be a chat request")
    }
}

#[derive(Debug, Clone)]
pub enum MockResponse {
    Fixed {
        status: u16,
        body: String,
    },
    Chunked {
        status: u16,
        chunks: Vec<Vec<u8>>,
        delay: Duration,
        /// Close the connection without the terminating chunk.
        truncate: bool,
    },
    /// Read the request and then wait for the client to hang up.
    Stall,
}

impl MockResponse {
    pub fn fixed(status: u16, body: &str) -> Self {
        MockResponse::Fixed {
            status,
            body: body.to_string(),
        }
    }

    pub fn chunked(status: u16, chunks: Vec<Vec<u8>>) -> Self {
        MockResponse::Chunked {
            status,
            chunks,
            delay: Duration::from_millis(5),
            truncate: false,
        }
    }

    pub fn truncated(chunks: Vec<Vec<u8>>) -> Self {
        MockResponse::Chunked {
            status: 200,
            chunks,
            delay: Duration::from_millis(5),
            truncate: true,
        }
    }
}

pub struct MockHttpServer {
    addr: SocketAddr,
    captured: Arc<tokio::sync::Mutex<Vec<CapturedRequest>>>,
    hangups: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockHttpServer {
    /// Serves `responses` to successive connections, one each.
    pub async fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let captured = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let hangups = Arc::new(AtomicUsize::new(0));

        let captured_for_server = Arc::clone(&captured);
        let hangups_for_server = Arc::clone(&hangups);
        let task = tokio::spawn(async move {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(request) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_for_server.lock().await.push(request);
                let hangups = Arc::clone(&hangups_for_server);
                tokio::spawn(async move {
                    let _ = write_response(&mut stream, response, &hangups).await;
                });
            }
        });

        Self {
            addr,
            captured,
            hangups,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }

    /// Number of stalled connections the client has closed.
    pub fn hangups(&self) -> usize {
        self.hangups.load(Ordering::SeqCst)
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

async fn write_response(
    stream: &mut TcpStream,
    response: MockResponse,
    hangups: &AtomicUsize,
) -> std::io::Result<()> {
    match response {
        MockResponse::Fixed { status, body } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\ncontent-type: text/plain; charset=utf-8\r\nconnection: close\r\ncontent-length: {}\r\n\r\n",
                reason_phrase(status),
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(body.as_bytes()).await?;
            stream.shutdown().await
        }
        MockResponse::Chunked {
            status,
            chunks,
            delay,
            truncate,
        } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\ncontent-type: text/plain; charset=utf-8\r\nconnection: close\r\ntransfer-encoding: chunked\r\n\r\n",
                reason_phrase(status)
            );
            stream.write_all(head.as_bytes()).await?;
            stream.flush().await?;
            for chunk in chunks {
                tokio::time::sleep(delay).await;
                stream
                    .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                    .await?;
                stream.write_all(&chunk).await?;
                stream.write_all(b"\r\n").await?;
                stream.flush().await?;
            }
            if !truncate {
                stream.write_all(b"0\r\n\r\n").await?;
            }
            stream.shutdown().await
        }
        MockResponse::Stall => {
            let mut buf = [0_u8; 256];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => {
                        hangups.fetch_add(1, Ordering::SeqCst);
                        return Ok(());
                    }
                    Ok(_) => continue,
                }
            }
        }
    }
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.ok_or_else(|| "Missing header terminator".to_string())?;
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length - body.len()];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

/// A client that ignores proxy environment variables, so requests to the
/// mock server stay on loopback.
pub fn no_proxy_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}

/// A loopback port with nothing listening on it.
pub async fn unused_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    listener
        .local_addr()
        .expect("local addr should resolve")
        .port()
}
