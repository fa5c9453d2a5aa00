//! The outbound chat completion seam.
//!
//! Conversation exchanges and credential probes both go through a
//! [`CompletionEndpoint`]. [`HttpEndpoint`] is the production implementation;
//! tests substitute scripted endpoints.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::api::ChatRequest;
use crate::core::stream_decoder::StreamReadFailure;

pub const DEFAULT_CHAT_PATH: &str = "api/chat";

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, StreamReadFailure>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The endpoint answered with a non-success status. The body is ignored.
    #[error("request rejected with HTTP status {status}")]
    Rejected { status: u16 },
    /// The request never got a response (DNS, refused connection, TLS, ...).
    #[error("transport failure: {0}")]
    Transport(String),
}

#[async_trait::async_trait]
pub trait CompletionEndpoint: Send + Sync {
    /// Sends `request` and, on an HTTP success status, returns the response
    /// body as a byte stream. Dropping the returned future or stream aborts
    /// the request.
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, RequestError>;
}

/// Joins `base_url` and `path` with exactly one slash between them.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(client: reqwest::Client, base_url: &str, chat_path: &str) -> Self {
        Self {
            client,
            url: endpoint_url(base_url, chat_path),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl CompletionEndpoint for HttpEndpoint {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, RequestError> {
        debug!(url = %self.url, model = %request.model, "Opening completion stream");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| RequestError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| StreamReadFailure::new(err.to_string()))
        });
        Ok(Box::pin(body))
    }
}
