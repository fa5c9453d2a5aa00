use serde::{Deserialize, Serialize};

pub mod endpoint;

pub use endpoint::{ByteStream, CompletionEndpoint, HttpEndpoint, RequestError};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_DEVELOPER_MESSAGE: &str = "You are a helpful AI assistant.";

/// Instruction sent with credential probes. Chosen to make the endpoint answer
/// with a short, predictable reply; the reply itself is never inspected.
pub const PROBE_DEVELOPER_MESSAGE: &str =
    "You are a connectivity check. Reply with the single word OK and nothing else.";
pub const PROBE_USER_MESSAGE: &str = "OK?";

/// Body of the chat completion request. The endpoint answers with a raw,
/// unframed UTF-8 text stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub developer_message: String,
    pub user_message: String,
    pub api_key: String,
    pub model: String,
}

impl ChatRequest {
    pub fn new(
        developer_message: impl Into<String>,
        user_message: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            developer_message: developer_message.into(),
            user_message: user_message.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// The lightweight request used to check whether `api_key` is accepted.
    pub fn probe(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(PROBE_DEVELOPER_MESSAGE, PROBE_USER_MESSAGE, api_key, model)
    }
}
