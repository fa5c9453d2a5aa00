use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{ChatRequest, CompletionEndpoint, RequestError};
use crate::core::observe::SharedState;

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_millis(5000);

pub const EMPTY_CREDENTIAL_MESSAGE: &str = "Enter an API key to continue.";
pub const REJECTED_MESSAGE: &str = "Invalid API key. Please check your key and try again.";
pub const TIMED_OUT_MESSAGE: &str =
    "Verification timed out. The chat service did not answer in time; please try again.";
pub const TRANSPORT_MESSAGE: &str =
    "Could not reach the chat service. Check your network connection and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Verifying,
    Valid,
    Invalid,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Verifying => "verifying",
            VerificationStatus::Valid => "valid",
            VerificationStatus::Invalid => "invalid",
        }
    }
}

/// Credential as typed by the user, plus what is known about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationState {
    pub credential: String,
    pub status: VerificationStatus,
    pub last_error: Option<String>,
    attempt: u64,
}

impl VerificationState {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            ..Self::default()
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.trim().is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.status == VerificationStatus::Valid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    Invalid,
    TimedOut,
    NetworkFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("no credential supplied")]
    MissingCredential,
    #[error("probe timed out after {timeout:?}")]
    TimedOut { timeout: Duration },
    #[error("probe rejected with HTTP status {status}")]
    Rejected { status: u16 },
    #[error("probe transport failure: {0}")]
    TransportFailure(String),
}

impl VerificationError {
    /// Static text safe to show to the user. Never includes status codes or
    /// transport details.
    pub fn user_message(&self) -> &'static str {
        match self {
            VerificationError::MissingCredential => EMPTY_CREDENTIAL_MESSAGE,
            VerificationError::TimedOut { .. } => TIMED_OUT_MESSAGE,
            VerificationError::Rejected { .. } => REJECTED_MESSAGE,
            VerificationError::TransportFailure(_) => TRANSPORT_MESSAGE,
        }
    }

    pub fn outcome(&self) -> VerificationOutcome {
        match self {
            VerificationError::MissingCredential | VerificationError::Rejected { .. } => {
                VerificationOutcome::Invalid
            }
            VerificationError::TimedOut { .. } => VerificationOutcome::TimedOut,
            VerificationError::TransportFailure(_) => VerificationOutcome::NetworkFailure,
        }
    }
}

impl From<RequestError> for VerificationError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Rejected { status } => VerificationError::Rejected { status },
            RequestError::Transport(reason) => VerificationError::TransportFailure(reason),
        }
    }
}

/// Checks whether the endpoint accepts a credential by sending one small
/// probe request under a deadline.
///
/// Any HTTP success counts as accepted; the probe's reply body is never read.
/// Every attempt remembers the credential it was issued for. When it finishes
/// after the credential was edited, or after a newer attempt started, its
/// result is dropped instead of being written to the state.
pub struct CredentialVerifier<E: ?Sized> {
    endpoint: Arc<E>,
    model: String,
    timeout: Duration,
    state: SharedState<VerificationState>,
    next_attempt: AtomicU64,
}

impl<E: CompletionEndpoint + ?Sized> CredentialVerifier<E> {
    pub fn new(endpoint: Arc<E>, model: impl Into<String>, timeout: Duration) -> Self {
        Self::with_state(
            endpoint,
            model,
            timeout,
            SharedState::new(VerificationState::default()),
        )
    }

    pub fn with_state(
        endpoint: Arc<E>,
        model: impl Into<String>,
        timeout: Duration,
        state: SharedState<VerificationState>,
    ) -> Self {
        Self {
            endpoint,
            model: model.into(),
            timeout,
            state,
            next_attempt: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SharedState<VerificationState> {
        self.state.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn current_credential(&self) -> String {
        self.state.read(|state| state.credential.clone())
    }

    /// Records new input, trimmed. A changed credential drops back to
    /// `Unverified` and orphans any probe still in flight for the old value.
    pub fn set_credential(&self, credential: &str) -> bool {
        let credential = credential.trim();
        self.state.update_if(|state| {
            if state.credential == credential {
                return false;
            }
            state.credential = credential.to_string();
            state.status = VerificationStatus::Unverified;
            state.last_error = None;
            true
        })
    }

    pub async fn verify_current(&self) -> VerificationOutcome {
        let credential = self.current_credential();
        self.verify(&credential).await
    }

    pub async fn verify(&self, credential: &str) -> VerificationOutcome {
        let attempt = self.next_attempt.fetch_add(1, Ordering::SeqCst) + 1;

        if credential.trim().is_empty() {
            let err = VerificationError::MissingCredential;
            self.apply(attempt, credential, Err(&err));
            return err.outcome();
        }

        let began = self.state.update_if(|state| {
            if state.credential != credential {
                return false;
            }
            state.status = VerificationStatus::Verifying;
            state.attempt = attempt;
            true
        });
        if !began {
            debug!(attempt, "Verifying a credential that is no longer current");
        }

        let result = self.probe(credential).await;
        let outcome = match &result {
            Ok(()) => VerificationOutcome::Verified,
            Err(err) => err.outcome(),
        };
        self.apply(attempt, credential, result.as_ref().map(|_| ()));
        outcome
    }

    async fn probe(&self, credential: &str) -> Result<(), VerificationError> {
        let request = ChatRequest::probe(credential, self.model.as_str());
        match tokio::time::timeout(self.timeout, self.endpoint.open(&request)).await {
            // Dropping the body closes the connection; only the status matters.
            Ok(Ok(_body)) => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(_elapsed) => Err(VerificationError::TimedOut {
                timeout: self.timeout,
            }),
        }
    }

    fn apply(&self, attempt: u64, credential: &str, result: Result<(), &VerificationError>) {
        let applied = self.state.update_if(|state| {
            if state.credential != credential || state.attempt > attempt {
                return false;
            }
            state.attempt = attempt;
            match result {
                Ok(()) => {
                    state.status = VerificationStatus::Valid;
                    state.last_error = None;
                }
                Err(err) => {
                    state.status = VerificationStatus::Invalid;
                    state.last_error = Some(err.user_message().to_string());
                }
            }
            true
        });

        match (applied, result) {
            (false, _) => debug!(attempt, "Discarded stale verification result"),
            (true, Ok(())) => info!(attempt, "Credential verified"),
            (true, Err(err)) => warn!(attempt, error = %err, "Credential verification failed"),
        }
    }
}
