//! Drives one exchange at a time: submit, stream, reveal, commit.
//!
//! ```text
//! Idle -> Submitting -> Streaming -> Revealing -> Idle
//!             |             |
//!             +-------------+--> Failed -> Idle
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{
    ChatRequest, CompletionEndpoint, RequestError, DEFAULT_DEVELOPER_MESSAGE, DEFAULT_MODEL,
};
use crate::core::accumulator::{
    ResponseAccumulator, ResponseView, RevealOutcome, DEFAULT_REVEAL_DELAY,
};
use crate::core::message::Message;
use crate::core::observe::SharedState;
use crate::core::store::ConversationStore;
use crate::core::stream_decoder::{StreamDecoder, StreamReadFailure};
use crate::core::timer::Scheduler;
use crate::core::verifier::{VerificationState, VerificationStatus};

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, I encountered an error. Please check your API key and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationMode {
    /// Every submission appends to the transcript.
    #[default]
    Chat,
    /// Every submission starts the transcript over.
    SingleTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationPolicy {
    /// The credential must have passed a probe before chatting.
    Required,
    /// Any non-empty credential may be used; the exchange itself is the check.
    #[default]
    Implicit,
}

/// Housekeeping for long-running displays: only the newest messages stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientSettings {
    pub keep_last: usize,
    pub prune_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub model: String,
    pub developer_message: String,
    pub mode: ConversationMode,
    pub verification: VerificationPolicy,
    pub reveal: bool,
    pub reveal_delay: Duration,
    pub fallback_message: String,
    pub ambient: Option<AmbientSettings>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            developer_message: DEFAULT_DEVELOPER_MESSAGE.to_string(),
            mode: ConversationMode::Chat,
            verification: VerificationPolicy::Implicit,
            reveal: false,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            ambient: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    #[default]
    Idle,
    Submitting,
    Streaming,
    Revealing,
    Failed,
}

impl ExchangePhase {
    pub fn is_busy(self) -> bool {
        self != ExchangePhase::Idle
    }

    pub fn is_streaming(self) -> bool {
        self == ExchangePhase::Streaming
    }
}

/// Everything a renderer needs to draw the conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub messages: ConversationStore,
    pub phase: ExchangePhase,
    /// Text received so far for the in-flight exchange.
    pub live_text: String,
    /// Paced copy of the finished response while revealing.
    pub revealed_text: String,
}

impl ConversationState {
    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }

    pub fn is_streaming(&self) -> bool {
        self.phase.is_streaming()
    }

    fn clear_transient(&mut self) {
        self.live_text.clear();
        self.revealed_text.clear();
    }
}

impl ResponseView for ConversationState {
    fn live_text(&self) -> &str {
        &self.live_text
    }

    fn revealed_text(&self) -> &str {
        &self.revealed_text
    }

    fn live_text_mut(&mut self) -> &mut String {
        &mut self.live_text
    }

    fn revealed_text_mut(&mut self) -> &mut String {
        &mut self.revealed_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("request rejected with HTTP status {status}")]
    RequestRejected { status: u16 },
    #[error(transparent)]
    StreamRead(#[from] StreamReadFailure),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<RequestError> for ExchangeError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Rejected { status } => ExchangeError::RequestRejected { status },
            RequestError::Transport(reason) => ExchangeError::Transport(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    MissingCredential,
    Unverified,
    Busy,
}

impl IgnoreReason {
    pub fn describe(self) -> &'static str {
        match self {
            IgnoreReason::EmptyInput => "Nothing to send.",
            IgnoreReason::MissingCredential => "Set an API key first.",
            IgnoreReason::Unverified => "Verify your API key first.",
            IgnoreReason::Busy => "Still working on the previous message.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed,
    /// The exchange ended with the fallback notice in the transcript. The
    /// error is for logs and callers, never for the transcript.
    Failed(ExchangeError),
    Ignored(IgnoreReason),
}

/// Puts the conversation back to idle if an exchange is abandoned midway,
/// e.g. when its future is dropped.
struct ExchangeGuard<'a> {
    state: &'a SharedState<ConversationState>,
    armed: bool,
}

impl ExchangeGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Exchange abandoned before completion");
            self.state.update(|state| {
                state.phase = ExchangePhase::Idle;
                state.clear_transient();
            });
        }
    }
}

pub struct ConversationController<E: ?Sized> {
    endpoint: Arc<E>,
    settings: ControllerSettings,
    developer_message: Mutex<String>,
    state: SharedState<ConversationState>,
    accumulator: ResponseAccumulator<ConversationState>,
    credentials: SharedState<VerificationState>,
    timers: Scheduler,
    /// Cancelled by `skip_reveal`; replaced when an exchange starts.
    skip: Mutex<CancellationToken>,
}

impl<E: CompletionEndpoint + ?Sized> ConversationController<E> {
    pub fn new(
        endpoint: Arc<E>,
        credentials: SharedState<VerificationState>,
        settings: ControllerSettings,
    ) -> Self {
        let state = SharedState::new(ConversationState::default());
        let accumulator =
            ResponseAccumulator::with_reveal_delay(state.clone(), settings.reveal_delay);
        Self {
            endpoint,
            developer_message: Mutex::new(settings.developer_message.clone()),
            settings,
            state,
            accumulator,
            credentials,
            timers: Scheduler::new(),
            skip: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.state.read(|state| state.is_busy())
    }

    pub fn developer_message(&self) -> String {
        self.developer_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies to the next exchange; one already in flight keeps its message.
    pub fn set_developer_message(&self, message: impl Into<String>) {
        *self
            .developer_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = message.into();
    }

    /// Empties the transcript. Refused while an exchange is running.
    pub fn clear(&self) -> bool {
        let cleared = self.state.update_if(|state| {
            if state.is_busy() {
                return false;
            }
            state.messages.clear();
            state.clear_transient();
            true
        });
        if cleared {
            self.timers.cancel_pending();
        }
        cleared
    }

    /// Jumps to the end of the typewriter effect; the exchange commits
    /// immediately. While the reply is still streaming, the replay that would
    /// follow it is skipped.
    pub fn skip_reveal(&self) {
        self.skip
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.accumulator.cancel_reveal();
    }

    fn arm_skip(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.skip.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let text = input.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let credential = match self.check_credential() {
            Ok(credential) => credential,
            Err(reason) => {
                debug!(?reason, "Submission ignored");
                return SubmitOutcome::Ignored(reason);
            }
        };

        let mode = self.settings.mode;
        let started = self.state.update_if(|state| {
            if state.is_busy() {
                return false;
            }
            state.phase = ExchangePhase::Submitting;
            state.clear_transient();
            let message = Message::user(text);
            match mode {
                ConversationMode::Chat => state.messages.append(message),
                ConversationMode::SingleTurn => state.messages.replace_all([message]),
            }
            true
        });
        if !started {
            debug!("Submission ignored while an exchange is in flight");
            return SubmitOutcome::Ignored(IgnoreReason::Busy);
        }
        let skip = self.arm_skip();
        self.after_append();

        let guard = ExchangeGuard {
            state: &self.state,
            armed: true,
        };
        let request = ChatRequest::new(
            self.developer_message(),
            text,
            credential,
            self.settings.model.as_str(),
        );
        info!(model = %request.model, chars = text.chars().count(), "Starting exchange");

        let outcome = match self.run_exchange(&request, &skip).await {
            Ok(content) => {
                self.commit(content);
                SubmitOutcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "Exchange failed");
                self.fail();
                SubmitOutcome::Failed(err)
            }
        };
        guard.disarm();
        outcome
    }

    fn check_credential(&self) -> Result<String, IgnoreReason> {
        let policy = self.settings.verification;
        self.credentials.read(|credentials| {
            if !credentials.has_credential() {
                return Err(IgnoreReason::MissingCredential);
            }
            match (policy, credentials.status) {
                (VerificationPolicy::Required, status) if status != VerificationStatus::Valid => {
                    Err(IgnoreReason::Unverified)
                }
                _ => Ok(credentials.credential.clone()),
            }
        })
    }

    async fn run_exchange(
        &self,
        request: &ChatRequest,
        skip: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let body = self.endpoint.open(request).await?;
        self.state.update(|state| state.phase = ExchangePhase::Streaming);

        let mut decoder = StreamDecoder::new(body);
        let mut fragments = 0usize;
        while let Some(fragment) = decoder.next_fragment().await? {
            self.accumulator.append(&fragment);
            fragments += 1;
        }
        let full_text = self.accumulator.live_text();
        debug!(fragments, bytes = full_text.len(), "Response stream finished");

        if !self.settings.reveal {
            return Ok(full_text);
        }
        if skip.is_cancelled() {
            debug!("Reveal skipped before it started");
            return Ok(full_text);
        }

        self.state.update(|state| state.phase = ExchangePhase::Revealing);
        let outcome = tokio::select! {
            biased;
            _ = skip.cancelled() => RevealOutcome::Cancelled,
            outcome = self.accumulator.reveal(&full_text) => outcome,
        };
        match outcome {
            // The last frame stays up for one step, like every other frame.
            RevealOutcome::Completed => {
                tokio::select! {
                    _ = skip.cancelled() => {}
                    _ = tokio::time::sleep(self.accumulator.reveal_delay()) => {}
                }
            }
            RevealOutcome::Cancelled => debug!("Reveal skipped"),
        }
        Ok(full_text)
    }

    fn commit(&self, content: String) {
        self.state.update(|state| {
            state.messages.append(Message::assistant(content));
            state.phase = ExchangePhase::Idle;
            state.clear_transient();
        });
        self.after_append();
    }

    fn fail(&self) {
        self.accumulator.cancel_reveal();
        let notice = self.settings.fallback_message.clone();
        self.state.update(|state| {
            state.messages.append(Message::assistant(notice));
            state.phase = ExchangePhase::Failed;
            state.clear_transient();
        });
        self.after_append();
        self.state.update(|state| state.phase = ExchangePhase::Idle);
    }

    fn after_append(&self) {
        let Some(ambient) = self.settings.ambient else {
            return;
        };
        let keep = ambient.keep_last;
        self.state.update_if(|state| {
            let len = state.messages.len();
            state
                .messages
                .mark_fade_after(|index, _| index + keep < len)
                > 0
        });

        // A newer append restarts the prune countdown.
        self.timers.cancel_pending();
        let state = self.state.clone();
        self.timers.schedule(ambient.prune_delay, move || {
            state.update_if(|state| state.messages.prune_to_last(keep) > 0);
        });
    }
}
