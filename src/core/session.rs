use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tracing::debug;

use crate::api::{CompletionEndpoint, HttpEndpoint};
use crate::core::config::Config;
use crate::core::controller::{
    ControllerSettings, ConversationController, ConversationState, SubmitOutcome,
};
use crate::core::verifier::{CredentialVerifier, VerificationOutcome, VerificationState};

/// One user's chat: the credential, its verifier, and the conversation it
/// unlocks, all talking to the same endpoint.
///
/// The verifier owns the credential state; the controller only reads it.
pub struct ChatSession<E: ?Sized = dyn CompletionEndpoint> {
    verifier: CredentialVerifier<E>,
    controller: ConversationController<E>,
}

impl ChatSession {
    pub fn from_config(config: &Config, client: Client, credential: &str) -> Self {
        let endpoint = HttpEndpoint::new(client, config.base_url(), config.chat_path());
        debug!(url = endpoint.url(), "Session endpoint");
        let endpoint: Arc<dyn CompletionEndpoint> = Arc::new(endpoint);
        Self::new(
            endpoint,
            credential,
            config.to_settings(),
            config.verify_timeout(),
        )
    }
}

impl<E: CompletionEndpoint + ?Sized> ChatSession<E> {
    pub fn new(
        endpoint: Arc<E>,
        credential: &str,
        settings: ControllerSettings,
        verify_timeout: Duration,
    ) -> Self {
        let verifier = CredentialVerifier::new(
            Arc::clone(&endpoint),
            settings.model.as_str(),
            verify_timeout,
        );
        verifier.set_credential(credential);
        let controller = ConversationController::new(endpoint, verifier.state(), settings);
        Self {
            verifier,
            controller,
        }
    }

    pub fn verifier(&self) -> &CredentialVerifier<E> {
        &self.verifier
    }

    pub fn controller(&self) -> &ConversationController<E> {
        &self.controller
    }

    pub fn set_credential(&self, credential: &str) -> bool {
        self.verifier.set_credential(credential)
    }

    pub async fn verify(&self) -> VerificationOutcome {
        self.verifier.verify_current().await
    }

    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        self.controller.submit(input).await
    }

    pub fn conversation(&self) -> watch::Receiver<ConversationState> {
        self.controller.subscribe()
    }

    pub fn credentials(&self) -> watch::Receiver<VerificationState> {
        self.verifier.state().subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controller::{IgnoreReason, VerificationPolicy};
    use crate::core::verifier::VerificationStatus;
    use crate::utils::test_utils::{Script, ScriptedEndpoint};

    fn session(
        scripts: Vec<Script>,
        verification: VerificationPolicy,
    ) -> (ScriptedEndpoint, ChatSession<ScriptedEndpoint>) {
        let endpoint = ScriptedEndpoint::new(scripts);
        let settings = ControllerSettings {
            verification,
            ..ControllerSettings::default()
        };
        let session = ChatSession::new(
            Arc::new(endpoint.clone()),
            " sk-live ",
            settings,
            Duration::from_secs(5),
        );
        (endpoint, session)
    }

    #[tokio::test]
    async fn verified_credential_unlocks_required_policy() {
        let (endpoint, session) = session(
            vec![Script::fragments(&["pong"]), Script::fragments(&["Hello!"])],
            VerificationPolicy::Required,
        );

        assert_eq!(
            session.submit("hi").await,
            SubmitOutcome::Ignored(IgnoreReason::Unverified)
        );
        assert_eq!(session.verify().await, VerificationOutcome::Verified);
        assert_eq!(session.submit("hi").await, SubmitOutcome::Completed);

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|request| request.api_key == "sk-live"));
    }

    #[tokio::test]
    async fn editing_the_credential_resets_verification() {
        let (_endpoint, session) = session(
            vec![Script::fragments(&["pong"])],
            VerificationPolicy::Required,
        );
        session.verify().await;
        assert_eq!(session.credentials().borrow().status, VerificationStatus::Valid);

        assert!(session.set_credential("sk-other"));
        assert!(!session.set_credential("  sk-other  "));
        let credentials = session.credentials().borrow().clone();
        assert_eq!(credentials.credential, "sk-other");
        assert_eq!(credentials.status, VerificationStatus::Unverified);
        assert_eq!(
            session.submit("hi").await,
            SubmitOutcome::Ignored(IgnoreReason::Unverified)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn verification_timeout_does_not_disturb_an_exchange() {
        let (endpoint, session) = session(
            vec![
                Script::Hang,
                Script::paced(&["still ", "here"], Duration::from_secs(3)),
            ],
            VerificationPolicy::Implicit,
        );

        let (verified, submitted) = tokio::join!(session.verify(), session.submit("hi"));
        assert_eq!(verified, VerificationOutcome::TimedOut);
        assert_eq!(submitted, SubmitOutcome::Completed);
        assert!(endpoint.hang_was_dropped());

        let state = session.controller().snapshot();
        assert_eq!(
            state.messages.last().map(|m| m.content.as_str()),
            Some("still here")
        );
        assert_eq!(
            session.credentials().borrow().status,
            VerificationStatus::Invalid
        );
    }
}
