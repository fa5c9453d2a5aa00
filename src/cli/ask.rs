//! Non-interactive "ask" command

use std::error::Error;

use crate::cli::exchange::run_exchange;
use crate::core::controller::{IgnoreReason, SubmitOutcome, VerificationPolicy};
use crate::core::session::ChatSession;
use crate::core::verifier::VerificationOutcome;

pub async fn run_ask(session: &ChatSession, prompt: &str) -> Result<(), Box<dyn Error>> {
    if prompt.trim().is_empty() {
        eprintln!("Usage: driftchat ask <prompt>");
        std::process::exit(1);
    }

    let policy = session.controller().settings().verification;
    if policy == VerificationPolicy::Required
        && session.verify().await != VerificationOutcome::Verified
    {
        let state = session.verifier().state().snapshot();
        eprintln!(
            "❌ {}",
            state.last_error.as_deref().unwrap_or("Verification failed.")
        );
        std::process::exit(1);
    }

    match run_exchange(session, prompt, std::future::pending()).await? {
        SubmitOutcome::Completed => Ok(()),
        SubmitOutcome::Failed(_) => std::process::exit(1),
        SubmitOutcome::Ignored(reason) => {
            eprintln!("❌ {}", reason.describe());
            if reason == IgnoreReason::MissingCredential {
                eprintln!("Pass --api-key or set DRIFTCHAT_API_KEY.");
            }
            std::process::exit(1);
        }
    }
}
